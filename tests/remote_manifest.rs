//! `mirror install --config-repo ... --config ...`: the manifest itself is
//! fetched from an upstream repository rather than read from the downstream
//! working tree, then copied into `.mirror.yaml` so future `check`/`sync`
//! runs no longer need the `--config-repo` flag.

use std::fs;
use std::process::Command;

use mirror::core::manager::{MIRROR_FILE, install_run};
use mirror::path::{AbsDir, Remote};

fn git(dir: &std::path::Path, args: &[&str]) {
    let status = Command::new("git").args(args).current_dir(dir).status().unwrap();
    assert!(status.success(), "git {args:?} failed");
}

fn init_repo(dir: &std::path::Path) {
    git(dir, &["init", "-q"]);
    git(dir, &["config", "user.email", "test@example.com"]);
    git(dir, &["config", "user.name", "test"]);
}

#[test]
fn install_with_remote_manifest_copies_it_into_downstream() {
    let content_upstream = tempfile::tempdir().unwrap();
    init_repo(content_upstream.path());
    fs::write(content_upstream.path().join("lib.rs"), "fn main() {}\n").unwrap();
    git(content_upstream.path(), &["add", "lib.rs"]);
    git(content_upstream.path(), &["commit", "-q", "-m", "init"]);

    let config_upstream = tempfile::tempdir().unwrap();
    init_repo(config_upstream.path());
    let manifest = format!(
        "repos:\n  - source: {}\n    files:\n      - lib.rs\n",
        content_upstream.path().display()
    );
    fs::write(config_upstream.path().join("m.yaml"), manifest).unwrap();
    git(config_upstream.path(), &["add", "m.yaml"]);
    git(config_upstream.path(), &["commit", "-q", "-m", "init"]);

    let downstream = tempfile::tempdir().unwrap();
    init_repo(downstream.path());
    let cache = tempfile::tempdir().unwrap();

    let target = AbsDir::new(downstream.path().to_str().unwrap());
    let cache_root = AbsDir::new(cache.path().to_str().unwrap());
    let config_repo = Remote::new(config_upstream.path().to_str().unwrap());

    install_run(target, cache_root, "m.yaml", Some(config_repo.to_string())).unwrap();

    assert_eq!(
        fs::read_to_string(downstream.path().join("lib.rs")).unwrap(),
        "fn main() {}\n"
    );
    let copied = fs::read_to_string(downstream.path().join(MIRROR_FILE)).unwrap();
    assert!(copied.contains("lib.rs"));
}
