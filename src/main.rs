use std::process::ExitCode;

use ariadne::{Color, Label, Report, ReportKind, Source};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mirror::cli::{Cli, Commands};
use mirror::core::manager::{check_run, install_run, sync_run};
use mirror::path::AbsDir;
use mirror::{MirrorError, vcs};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let target = match AbsDir::cwd() {
        Ok(dir) => dir,
        Err(e) => {
            tracing::error!("could not resolve the current directory: {e}");
            return ExitCode::FAILURE;
        }
    };

    if !vcs::is_repository(&target) {
        report(&MirrorError::NotARepository(target.as_path().to_path_buf()));
        return ExitCode::FAILURE;
    }

    let cache_root = match mirror::cache::root() {
        Ok(root) => root,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match run(cli.command, target, cache_root) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

/// Dispatches to the three subcommands; the bool is `check`'s up-to-date
/// result, ignored (always `true`) by `install`/`sync`.
fn run(command: Commands, target: AbsDir, cache_root: AbsDir) -> mirror::Result<bool> {
    match command {
        Commands::Install(args) => {
            install_run(target, cache_root, &args.config, args.config_repo)?;
            Ok(true)
        }
        Commands::Check(args) => check_run(target, cache_root, args.pre_commit),
        Commands::Sync => {
            sync_run(target, cache_root)?;
            Ok(true)
        }
    }
}

/// `-v`/`-q` move the default `INFO` level up or down in one step per
/// occurrence, clamped to `TRACE`/`OFF` (spec §6: "up to ×2"/"up to ×3").
fn init_tracing(verbose: u8, quiet: u8) {
    const LEVELS: [&str; 7] = ["off", "error", "warn", "warn", "info", "debug", "trace"];
    let base = 4i32; // index of "info"
    let shift = i32::from(verbose.min(2)) - i32::from(quiet.min(3));
    let index = (base + shift).clamp(0, (LEVELS.len() - 1) as i32) as usize;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(LEVELS[index]));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .with_target(false)
        .init();
}

/// Logs and prints `err`; manifest parse errors get an `ariadne` snippet,
/// everything else gets the one-line message `Display` already produces
/// (spec §7: "logged at ERROR with class name and single-line message").
fn report(err: &MirrorError) {
    if let MirrorError::Parser(parse_err) = err {
        render_parse_error(parse_err);
        return;
    }
    tracing::error!("{err}");
}

fn render_parse_error(err: &mirror::manifest::ParseError) {
    let id = err.file.clone();
    let offset = err.span.offset();
    let len = err.span.len().max(1);
    let range = offset..offset + len;

    let mut report = Report::build(ReportKind::Error, (&id, range.clone()))
        .with_message(&err.message)
        .with_label(
            Label::new((&id, range))
                .with_message(&err.label)
                .with_color(Color::Red),
        );
    if let Some(help) = &err.help {
        report = report.with_help(help);
    }

    let _ = report
        .finish()
        .print((&id, Source::from(err.src.clone())));
}
