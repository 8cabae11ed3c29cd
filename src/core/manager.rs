//! Manager / command entry points (spec §4.I, §4.J).
//!
//! [`run_phase`] is the one generalised algorithm from spec §4.I, shared by
//! [`Installer`], [`Checker`] and [`Syncer`]: open-or-create the downstream
//! lock, run a phase closure that produces the mirror's new state, write
//! that state and release on success, delete (install) or keep (check/sync)
//! the lock on failure.

use tracing::{instrument, warn};

use crate::core::lockfile::{DownstreamLock, LockError};
use crate::core::manifest::{self, MirrorConfig};
use crate::core::mirror::Mirror;
use crate::core::repo::Repo;
use crate::core::state::MirrorState;
use crate::core::vcs;
use crate::error::{MirrorError, Result};
use crate::path::{AbsDir, AbsFile, RelFile, Remote};

/// Filename of the manifest at the downstream repository root.
pub const MIRROR_FILE: &str = ".mirror.yaml";
/// Filename of the version-controlled lock file.
pub const MIRROR_LOCK: &str = ".mirror.lock";

fn lock_file_path(target: &AbsDir) -> AbsFile {
    target / &RelFile::new(MIRROR_LOCK)
}

fn manifest_file_path(target: &AbsDir) -> AbsFile {
    target / &RelFile::new(MIRROR_FILE)
}

fn map_lock_err(e: LockError, path: &AbsFile) -> MirrorError {
    match e {
        LockError::AlreadyInstalled => MirrorError::AlreadyInstalled(path.as_path().to_path_buf()),
        LockError::InUse => MirrorError::InUse(path.as_path().to_path_buf()),
        LockError::NotInstalled => MirrorError::NotInstalled(path.as_path().to_path_buf()),
        LockError::Io(e) => MirrorError::Io(e),
        LockError::State(e) => {
            MirrorError::StateLoadError(path.as_path().to_path_buf(), e.to_string())
        }
    }
}

/// Stage the lock and manifest files into the downstream repository's
/// index. Mirrors `GitHelper.add(self.target, MIRROR_LOCK, MIRROR_FILE)` in
/// the original `MirrorManager._run` — failures are logged, not fatal,
/// since staging is a convenience for the caller's next commit, not a
/// correctness requirement of the sync itself.
fn stage_manifest_and_lock(target: &AbsDir) {
    if let Err(e) = vcs::add(target, &[RelFile::new(MIRROR_LOCK), RelFile::new(MIRROR_FILE)]) {
        warn!("could not stage {MIRROR_LOCK}/{MIRROR_FILE}: {e}");
    }
}

/// The one generalised algorithm of spec §4.I.
fn run_phase(
    lock: DownstreamLock,
    target: &AbsDir,
    keep_lock_on_failure: bool,
    phase: impl FnOnce() -> Result<MirrorState>,
) -> Result<()> {
    match phase() {
        Ok(state) => {
            lock.unlock(&state).map_err(|e| map_lock_err(e, &lock_file_path(target)))?;
            stage_manifest_and_lock(target);
            Ok(())
        }
        Err(e) => {
            if !keep_lock_on_failure {
                let _ = lock.delete();
            }
            Err(e)
        }
    }
}

fn parse_manifest(label: &str, text: &str) -> Result<MirrorConfig> {
    manifest::parse(label, text).map_err(MirrorError::from)
}

/// Spec §4.J: `mirror install`.
pub struct Installer {
    target: AbsDir,
    cache_root: AbsDir,
    config_path: String,
    config_repo: Option<Remote>,
}

impl Installer {
    pub fn new(
        target: AbsDir,
        cache_root: AbsDir,
        config_path: impl Into<String>,
        config_repo: Option<String>,
    ) -> Self {
        Self {
            target,
            cache_root,
            config_path: config_path.into(),
            config_repo: config_repo.map(Remote::new),
        }
    }

    #[instrument(skip(self))]
    pub fn install(self) -> Result<()> {
        let lock_path = lock_file_path(&self.target);
        let lock = DownstreamLock::create(&lock_path).map_err(|e| map_lock_err(e, &lock_path))?;
        let target = self.target.clone();
        run_phase(lock, &target, false, || self.run_install())
    }

    fn run_install(&self) -> Result<MirrorState> {
        let config = self.load_and_materialize_config()?;
        let mirror = Mirror::from_config(&config, &self.cache_root);
        mirror.checkout_all()?;
        let empty = MirrorState::empty();
        mirror.update_all(&empty, &self.target)?;
        let state = mirror.state()?;

        if self.manifest_mirrors_itself(&config) {
            warn!("{MIRROR_FILE} was updated by this install; re-parsing to finish in one pass");
            return self.finish_self_referential_install(state);
        }
        Ok(state)
    }

    fn manifest_mirrors_itself(&self, config: &MirrorConfig) -> bool {
        config
            .repos
            .iter()
            .any(|r| r.files.iter().any(|f| f.target.as_path().as_str() == MIRROR_FILE))
    }

    fn finish_self_referential_install(&self, prior: MirrorState) -> Result<MirrorState> {
        let text = std::fs::read_to_string(manifest_file_path(&self.target).as_path())?;
        let config = parse_manifest(MIRROR_FILE, &text)?;
        let mirror = Mirror::from_config(&config, &self.cache_root);
        mirror.checkout_all()?;
        mirror.update_all(&prior, &self.target)?;
        mirror.state()
    }

    /// Resolve `--config`/`--config-repo` into parsed config, copying it
    /// into the downstream `.mirror.yaml` when it came from elsewhere
    /// (spec §4.I "Copying the manifest in Install").
    fn load_and_materialize_config(&self) -> Result<MirrorConfig> {
        let (text, label, came_from_elsewhere) = self.read_config_text()?;
        let config = parse_manifest(&label, &text)?;

        if came_from_elsewhere {
            let canonical = manifest_file_path(&self.target);
            let existed = canonical.exists();
            let unchanged =
                existed && std::fs::read_to_string(canonical.as_path()).map(|s| s == text).unwrap_or(false);
            if !unchanged {
                std::fs::write(canonical.as_path(), &text)?;
                if existed {
                    warn!("{MIRROR_FILE} has been overwritten during installation");
                }
            }
        }
        Ok(config)
    }

    fn read_config_text(&self) -> Result<(String, String, bool)> {
        match &self.config_repo {
            Some(remote) => {
                let relative = self.config_path.trim_start_matches('/');
                let source = RelFile::new(relative);
                let repo = Repo::new(
                    crate::core::manifest::RepoSpec {
                        source: remote.clone(),
                        files: vec![crate::core::manifest::FileSpec {
                            source: source.clone(),
                            target: RelFile::new(MIRROR_FILE),
                        }],
                    },
                    self.cache_root.clone(),
                );
                repo.checkout()?;
                let slot = crate::core::cache::slot_for(&self.cache_root, remote);
                let abs = &slot / &source;
                let text = std::fs::read_to_string(abs.as_path())?;
                Ok((text, format!("{remote}:{relative}"), true))
            }
            None => {
                let abs = self.resolve_local_path();
                let text = std::fs::read_to_string(abs.as_path())?;
                let differs_from_default = abs.as_path() != manifest_file_path(&self.target).as_path();
                Ok((text, self.config_path.clone(), differs_from_default))
            }
        }
    }

    fn resolve_local_path(&self) -> AbsFile {
        if self.config_path.starts_with('/') {
            AbsFile::new(&self.config_path)
        } else {
            &self.target / &RelFile::new(&self.config_path)
        }
    }
}

/// Spec §4.J: `mirror check`.
pub struct Checker {
    target: AbsDir,
    cache_root: AbsDir,
    pre_commit: bool,
}

impl Checker {
    pub fn new(target: AbsDir, cache_root: AbsDir, pre_commit: bool) -> Self {
        Self {
            target,
            cache_root,
            pre_commit,
        }
    }

    /// Returns `true` when every mirrored file is up to date; the caller
    /// maps that to an exit code (spec §6: 0 on up to date, 1 otherwise).
    #[instrument(skip(self))]
    pub fn check(self) -> Result<bool> {
        let lock_path = lock_file_path(&self.target);
        let mut lock = DownstreamLock::edit(&lock_path).map_err(|e| map_lock_err(e, &lock_path))?;
        let prior = lock.load_state().map_err(|e| map_lock_err(e, &lock_path))?;
        let target = self.target.clone();

        let mut up_to_date = false;
        let result = run_phase(lock, &target, true, || {
            let config = self.load_config()?;
            let mirror = Mirror::from_config(&config, &self.cache_root);
            up_to_date = mirror.check(&prior)?;
            mirror.state()
        });

        result?;
        if !up_to_date && self.pre_commit {
            tracing::error!(
                "{MIRROR_FILE} config files are not up to date; run `mirror sync` to update"
            );
        }
        Ok(up_to_date)
    }

    fn load_config(&self) -> Result<MirrorConfig> {
        let text = std::fs::read_to_string(manifest_file_path(&self.target).as_path())?;
        parse_manifest(MIRROR_FILE, &text)
    }
}

/// Spec §4.J: `mirror sync`.
pub struct Syncer {
    target: AbsDir,
    cache_root: AbsDir,
}

impl Syncer {
    pub fn new(target: AbsDir, cache_root: AbsDir) -> Self {
        Self { target, cache_root }
    }

    #[instrument(skip(self))]
    pub fn sync(self) -> Result<()> {
        let lock_path = lock_file_path(&self.target);
        let mut lock = DownstreamLock::edit(&lock_path).map_err(|e| map_lock_err(e, &lock_path))?;
        let prior = lock.load_state().map_err(|e| map_lock_err(e, &lock_path))?;
        let target = self.target.clone();

        run_phase(lock, &target, true, || {
            let text = std::fs::read_to_string(manifest_file_path(&target).as_path())?;
            let config = parse_manifest(MIRROR_FILE, &text)?;
            let mirror = Mirror::from_config(&config, &self.cache_root);
            mirror.checkout_all()?;
            mirror.update_all(&prior, &target)?;
            mirror.state()
        })
    }
}

/// Thin wrappers matching the teacher's `core::extract_run`-style flat
/// entry points, called directly from [`crate::main`].
pub fn install_run(
    target: AbsDir,
    cache_root: AbsDir,
    config_path: &str,
    config_repo: Option<String>,
) -> Result<()> {
    Installer::new(target, cache_root, config_path, config_repo).install()
}

pub fn check_run(target: AbsDir, cache_root: AbsDir, pre_commit: bool) -> Result<bool> {
    Checker::new(target, cache_root, pre_commit).check()
}

pub fn sync_run(target: AbsDir, cache_root: AbsDir) -> Result<()> {
    Syncer::new(target, cache_root).sync()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::process::Command;

    fn git(dir: &std::path::Path, args: &[&str]) {
        let status = Command::new("git").args(args).current_dir(dir).status().unwrap();
        assert!(status.success(), "git {args:?} failed");
    }

    fn init_upstream(dir: &std::path::Path) {
        git(dir, &["init", "-q"]);
        git(dir, &["config", "user.email", "test@example.com"]);
        git(dir, &["config", "user.name", "test"]);
        fs::write(dir.join("a.txt"), "hello").unwrap();
        git(dir, &["add", "a.txt"]);
        git(dir, &["commit", "-q", "-m", "init"]);
    }

    fn init_downstream(dir: &std::path::Path) {
        git(dir, &["init", "-q"]);
        git(dir, &["config", "user.email", "test@example.com"]);
        git(dir, &["config", "user.name", "test"]);
    }

    #[test]
    fn install_then_check_reports_up_to_date() {
        let upstream = tempfile::tempdir().unwrap();
        init_upstream(upstream.path());
        let downstream = tempfile::tempdir().unwrap();
        init_downstream(downstream.path());
        let cache = tempfile::tempdir().unwrap();

        let manifest = format!(
            "repos:\n  - source: {}\n    files:\n      - a.txt\n",
            upstream.path().display()
        );
        fs::write(downstream.path().join(MIRROR_FILE), manifest).unwrap();

        let target = AbsDir::new(downstream.path().to_str().unwrap());
        let cache_root = AbsDir::new(cache.path().to_str().unwrap());

        install_run(target.clone(), cache_root.clone(), MIRROR_FILE, None).unwrap();
        assert_eq!(fs::read_to_string(downstream.path().join("a.txt")).unwrap(), "hello");
        assert!(downstream.path().join(MIRROR_LOCK).exists());

        let up_to_date = check_run(target, cache_root, false).unwrap();
        assert!(up_to_date);
    }

    #[test]
    fn check_reports_behind_after_upstream_change() {
        let upstream = tempfile::tempdir().unwrap();
        init_upstream(upstream.path());
        let downstream = tempfile::tempdir().unwrap();
        init_downstream(downstream.path());
        let cache = tempfile::tempdir().unwrap();

        let manifest = format!(
            "repos:\n  - source: {}\n    files:\n      - a.txt\n",
            upstream.path().display()
        );
        fs::write(downstream.path().join(MIRROR_FILE), manifest).unwrap();

        let target = AbsDir::new(downstream.path().to_str().unwrap());
        let cache_root = AbsDir::new(cache.path().to_str().unwrap());
        install_run(target.clone(), cache_root.clone(), MIRROR_FILE, None).unwrap();

        fs::write(upstream.path().join("a.txt"), "hello2").unwrap();
        git(upstream.path(), &["commit", "-aqm", "change"]);

        let up_to_date = check_run(target, cache_root, false).unwrap();
        assert!(!up_to_date);
    }

    #[test]
    fn sync_three_way_merges_local_edit_with_upstream_change() {
        let upstream = tempfile::tempdir().unwrap();
        init_upstream(upstream.path());
        let downstream = tempfile::tempdir().unwrap();
        init_downstream(downstream.path());
        let cache = tempfile::tempdir().unwrap();

        let manifest = format!(
            "repos:\n  - source: {}\n    files:\n      - a.txt\n",
            upstream.path().display()
        );
        fs::write(downstream.path().join(MIRROR_FILE), manifest).unwrap();

        let target = AbsDir::new(downstream.path().to_str().unwrap());
        let cache_root = AbsDir::new(cache.path().to_str().unwrap());
        install_run(target.clone(), cache_root.clone(), MIRROR_FILE, None).unwrap();

        fs::write(downstream.path().join("a.txt"), "hello\nlocal").unwrap();
        fs::write(upstream.path().join("a.txt"), "hello2").unwrap();
        git(upstream.path(), &["commit", "-aqm", "change"]);

        sync_run(target, cache_root).unwrap();
        let merged = fs::read_to_string(downstream.path().join("a.txt")).unwrap();
        assert_eq!(merged, "hello2\nlocal");
    }

    #[test]
    fn sync_leaves_conflict_markers_without_aborting_on_genuine_conflict() {
        let upstream = tempfile::tempdir().unwrap();
        init_upstream(upstream.path());
        fs::write(upstream.path().join("a.txt"), "line1\nline2\nline3\n").unwrap();
        git(upstream.path(), &["commit", "-aqm", "multiline"]);

        let downstream = tempfile::tempdir().unwrap();
        init_downstream(downstream.path());
        let cache = tempfile::tempdir().unwrap();

        let manifest = format!(
            "repos:\n  - source: {}\n    files:\n      - a.txt\n",
            upstream.path().display()
        );
        fs::write(downstream.path().join(MIRROR_FILE), manifest).unwrap();

        let target = AbsDir::new(downstream.path().to_str().unwrap());
        let cache_root = AbsDir::new(cache.path().to_str().unwrap());
        install_run(target.clone(), cache_root.clone(), MIRROR_FILE, None).unwrap();

        // Downstream and upstream both change the same line differently, so
        // the three-way merge cannot reconcile them automatically.
        fs::write(downstream.path().join("a.txt"), "line1\nlocal-change\nline3\n").unwrap();
        fs::write(upstream.path().join("a.txt"), "line1\nupstream-change\nline3\n").unwrap();
        git(upstream.path(), &["commit", "-aqm", "conflicting change"]);

        // Must not abort the sync: the conflict is reported in the file,
        // not surfaced as an error.
        sync_run(target, cache_root).unwrap();

        let merged = fs::read_to_string(downstream.path().join("a.txt")).unwrap();
        assert!(merged.contains("<<<<<<<"));
        assert!(merged.contains(">>>>>>>"));
        assert!(merged.contains("local-change"));
        assert!(merged.contains("upstream-change"));
    }

    #[test]
    fn second_install_fails_already_installed() {
        let upstream = tempfile::tempdir().unwrap();
        init_upstream(upstream.path());
        let downstream = tempfile::tempdir().unwrap();
        init_downstream(downstream.path());
        let cache = tempfile::tempdir().unwrap();

        let manifest = format!(
            "repos:\n  - source: {}\n    files:\n      - a.txt\n",
            upstream.path().display()
        );
        fs::write(downstream.path().join(MIRROR_FILE), manifest).unwrap();

        let target = AbsDir::new(downstream.path().to_str().unwrap());
        let cache_root = AbsDir::new(cache.path().to_str().unwrap());
        install_run(target.clone(), cache_root.clone(), MIRROR_FILE, None).unwrap();

        let err = install_run(target, cache_root, MIRROR_FILE, None).unwrap_err();
        assert!(matches!(err, MirrorError::AlreadyInstalled(_)));
    }
}
