use clap::Parser;
use mirror::cli::{Cli, Commands};

#[test]
fn install_flag_parsing() {
    let argv = vec![
        "mirror",
        "install",
        "--config",
        "vendor.yaml",
        "--config-repo",
        "git@github.com:acme/configs.git",
    ];

    let cmd = Cli::parse_from(argv);

    match cmd.command {
        Commands::Install(args) => {
            assert_eq!(args.config, "vendor.yaml");
            assert_eq!(args.config_repo.as_deref(), Some("git@github.com:acme/configs.git"));
        }
        _ => panic!("expected Install command"),
    }
}

#[test]
fn install_config_defaults_to_mirror_yaml() {
    let cmd = Cli::parse_from(vec!["mirror", "install"]);
    match cmd.command {
        Commands::Install(args) => {
            assert_eq!(args.config, ".mirror.yaml");
            assert!(args.config_repo.is_none());
        }
        _ => panic!("expected Install command"),
    }
}

#[test]
fn check_pre_commit_flag() {
    let cmd = Cli::parse_from(vec!["mirror", "check", "--pre-commit"]);
    match cmd.command {
        Commands::Check(args) => assert!(args.pre_commit),
        _ => panic!("expected Check command"),
    }
}

#[test]
fn sync_takes_no_arguments() {
    let cmd = Cli::parse_from(vec!["mirror", "sync"]);
    assert!(matches!(cmd.command, Commands::Sync));
}

#[test]
fn verbose_and_quiet_flags_are_counted() {
    let cmd = Cli::parse_from(vec!["mirror", "-vv", "sync"]);
    assert_eq!(cmd.verbose, 2);
    assert_eq!(cmd.quiet, 0);

    let cmd = Cli::parse_from(vec!["mirror", "-qqq", "sync"]);
    assert_eq!(cmd.quiet, 3);
}
