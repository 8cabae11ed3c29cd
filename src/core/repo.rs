//! Repo engine (spec §4.F).
//!
//! One [`Repo`] wraps a single upstream: checking out (or refreshing) its
//! cache slot, verifying the files the manifest references actually exist
//! there, diffing each against whatever commit the lock last recorded for
//! it, and driving [`crate::core::vcs::apply_three_way`] to reproduce that
//! diff on the downstream tree. Tracing spans wrap `checkout`/`update` the
//! way `#[instrument]` wraps `validate_anchor_with_hints` in the teacher's
//! `cli_ext::anchor_cmd`.

use std::collections::BTreeSet;

use tracing::{instrument, warn};

use crate::core::cache;
use crate::core::manifest::{FileSpec, RepoSpec};
use crate::core::semaphore::{DEFAULT_TIMEOUT, Semaphore, SemaphoreError};
use crate::core::state::RepoState;
use crate::core::vcs::{self, FileKind};
use crate::error::{MirrorError, Result};
use crate::path::{AbsDir, Commit, RelFile, Remote};

/// One file's up-to-date status, as reported by [`Repo::all_up_to_date`].
pub struct FileStatus {
    pub target: RelFile,
    pub up_to_date: bool,
    pub explanation: String,
}

/// A single upstream and the files mirrored from it.
pub struct Repo {
    spec: RepoSpec,
    cache_root: AbsDir,
}

impl Repo {
    pub fn new(spec: RepoSpec, cache_root: AbsDir) -> Self {
        Self { spec, cache_root }
    }

    pub fn source(&self) -> &Remote {
        &self.spec.source
    }

    pub fn spec(&self) -> &RepoSpec {
        &self.spec
    }

    fn slot(&self) -> AbsDir {
        cache::slot_for(&self.cache_root, &self.spec.source)
    }

    /// Spec §4.F `checkout()`: acquire the slot semaphore, clone/fetch as
    /// leader (or wait as follower), then verify every referenced file
    /// exists in the cloned tree as a regular file.
    #[instrument(skip(self), fields(source = %self.spec.source))]
    pub fn checkout(&self) -> Result<()> {
        let slot = self.slot();
        let sem_path = slot.sibling_file(".sem");
        let sync_path = slot.sibling_file(".sync");

        let semaphore = Semaphore::acquire(&sem_path).map_err(MirrorError::Io)?;
        if semaphore.is_leader() {
            self.do_checkout(&slot)?;
        }
        self.wait_for_leader(&semaphore, &sync_path)?;
        self.verify_files(&slot)
    }

    fn wait_for_leader(&self, semaphore: &Semaphore, sync_path: &crate::path::AbsFile) -> Result<()> {
        semaphore
            .synchronize(sync_path, DEFAULT_TIMEOUT)
            .map_err(|e| match e {
                SemaphoreError::Timeout => MirrorError::WaitTimeout(self.spec.source.clone()),
                SemaphoreError::Io(io) => MirrorError::Io(io),
            })
    }

    /// clone → fetch+reset → reclone, per spec §4.F step 2.
    fn do_checkout(&self, slot: &AbsDir) -> Result<()> {
        if vcs::clone(&self.spec.source, slot).is_ok() {
            return Ok(());
        }
        if slot.exists() && vcs::fetch_and_reset_head(slot).is_ok() {
            return Ok(());
        }
        let _ = std::fs::remove_dir_all(slot.as_path());
        vcs::clone(&self.spec.source, slot)
            .map_err(|_| MirrorError::CheckoutUnavailable(self.spec.source.clone()))
    }

    fn verify_files(&self, slot: &AbsDir) -> Result<()> {
        for file in &self.spec.files {
            match vcs::file_kind(slot, None, &file.source)? {
                FileKind::Regular => {}
                FileKind::Missing => {
                    return Err(MirrorError::MissingFile {
                        remote: self.spec.source.clone(),
                        path: file.source.as_path().to_path_buf(),
                    });
                }
                FileKind::Directory => {
                    return Err(MirrorError::IsADirectory {
                        remote: self.spec.source.clone(),
                        path: file.source.as_path().to_path_buf(),
                    });
                }
                FileKind::Other => {
                    return Err(MirrorError::IrregularFile {
                        remote: self.spec.source.clone(),
                        path: file.source.as_path().to_path_buf(),
                    });
                }
            }
        }
        Ok(())
    }

    /// The recorded commit for `file`, if `prior` both exists and already
    /// lists it (spec §3 `VersionedFile`: absent ⇒ never mirrored).
    fn recorded_commit(prior: Option<&RepoState>, file: &FileSpec) -> Option<Commit> {
        prior
            .filter(|state| state.files.contains(&file.source))
            .map(|state| state.commit.clone())
    }

    /// Spec §4.F `all_up_to_date()`.
    pub fn all_up_to_date(&self, prior: Option<&RepoState>) -> Result<Vec<FileStatus>> {
        let slot = self.slot();
        let head = vcs::head_commit(&slot)?;
        let mut statuses = Vec::with_capacity(self.spec.files.len());
        for file in &self.spec.files {
            let (up_to_date, explanation) = match Self::recorded_commit(prior, file) {
                None => (
                    false,
                    format!("'{}' was never mirrored from {}", file.target, self.spec.source),
                ),
                Some(commit) if commit == head => {
                    (true, format!("'{}' is up to date", file.target))
                }
                Some(commit) => (
                    false,
                    format!(
                        "'{}' has commit {}, but {} has commit {}",
                        file.target,
                        commit.short(),
                        self.spec.source,
                        head.short()
                    ),
                ),
            };
            statuses.push(FileStatus {
                target: file.target.clone(),
                up_to_date,
                explanation,
            });
        }
        Ok(statuses)
    }

    /// Spec §4.F `update(target_dir)`: three-way apply a patch per file.
    #[instrument(skip(self, target_dir), fields(source = %self.spec.source))]
    pub fn update(&self, prior: Option<&RepoState>, target_dir: &AbsDir) -> Result<()> {
        let slot = self.slot();
        for file in &self.spec.files {
            let patch = match Self::recorded_commit(prior, file) {
                None => {
                    let raw = vcs::diff_to_devnull(&slot, &file.source)
                        .map_err(|e| self.diff_failure(&file.source, e))?;
                    new_file_patch(&raw, &file.target)
                }
                Some(commit) => {
                    let raw = vcs::diff_from_commit(&slot, &commit, &file.source)
                        .map_err(|e| self.diff_failure(&file.source, e))?;
                    let base = vcs::blob(&slot, &commit, &file.source)
                        .map_err(|e| self.diff_failure(&file.source, e))?;
                    vcs::hash_object(target_dir, &base)?;
                    existing_file_patch(&raw, &file.target)
                }
            };

            // The file may be new to the index; failing to `add` it first
            // is expected and ignored (spec §4.F).
            let _ = vcs::add(target_dir, std::slice::from_ref(&file.target));

            let outcome = vcs::apply_three_way(target_dir, &patch, true, &file.target)?;
            match outcome.status {
                vcs::ApplyStatus::Clean => {}
                vcs::ApplyStatus::Conflicted => {
                    warn!(
                        "'{}' was merged with conflict markers; resolve them before committing",
                        file.target
                    );
                }
                vcs::ApplyStatus::Failed => {
                    return Err(MirrorError::ApplyFailure {
                        remote: self.spec.source.clone(),
                        path: file.target.as_path().to_path_buf(),
                        reason: outcome.stderr,
                    });
                }
            }
        }
        Ok(())
    }

    /// Spec §7 `DiffFailure`: "backend could not compute a diff (e.g. commit
    /// missing locally)" — covers `diff_to_devnull`/`diff_from_commit`/`blob`,
    /// every backend call that reads the diff or its base rather than
    /// applying it.
    fn diff_failure(&self, source: &RelFile, e: vcs::VcsError) -> MirrorError {
        MirrorError::DiffFailure {
            remote: self.spec.source.clone(),
            path: source.as_path().to_path_buf(),
            reason: e.to_string(),
        }
    }

    /// Spec §4.F `state`: `{source, commit: current HEAD, files: sorted
    /// deduplicated set of referenced sources}`.
    pub fn state(&self) -> Result<RepoState> {
        let slot = self.slot();
        let commit = vcs::head_commit(&slot)?;
        let files: BTreeSet<RelFile> = self.spec.files.iter().map(|f| f.source.clone()).collect();
        Ok(RepoState {
            source: self.spec.source.clone(),
            commit,
            files: files.into_iter().collect(),
        })
    }
}

/// No recorded commit ⇒ the file is brand new downstream. Rewrite a
/// `diff --no-index /dev/null <source>` patch so `+++` names `target`
/// (spec §4.F: "rewrite its header so +++ refers to target and the
/// deletion side refers to /dev/null" — the deletion side already is
/// `/dev/null`, so only `+++` and the synthesised `diff --git` line move).
fn new_file_patch(raw: &str, target: &RelFile) -> String {
    let mut out = Vec::new();
    let mut saw_hunk = false;
    for line in raw.lines() {
        if line.starts_with("diff --git") {
            out.push(format!("diff --git a/{target} b/{target}"));
        } else if let Some(rest) = line.strip_prefix("+++") {
            let _ = rest;
            out.push(format!("+++ b/{target}"));
        } else {
            if line.starts_with("@@") {
                saw_hunk = true;
            }
            out.push(line.to_string());
        }
    }
    if !saw_hunk {
        return empty_patch_skeleton(target);
    }
    join_with_trailing_newline(&out)
}

/// A recorded commit exists ⇒ diff the upstream's working tree against it.
/// Both `---` and `+++` are rewritten to `target` (spec §4.F: "Rewrite ---
/// and +++ header lines so both point to target. Prepend a synthesised
/// `diff --git a/target b/target` header.").
fn existing_file_patch(raw: &str, target: &RelFile) -> String {
    let mut out = Vec::new();
    let mut saw_hunk = false;
    for line in raw.lines() {
        if line.starts_with("diff --git") {
            continue;
        } else if line.starts_with("---") {
            out.push(format!("--- a/{target}"));
        } else if line.starts_with("+++") {
            out.push(format!("+++ b/{target}"));
        } else {
            if line.starts_with("@@") {
                saw_hunk = true;
            }
            out.push(line.to_string());
        }
    }
    let mut result = format!("diff --git a/{target} b/{target}\n");
    if !saw_hunk {
        result.push_str(&empty_patch_skeleton(target));
        return result;
    }
    result.push_str(&join_with_trailing_newline(&out));
    result
}

/// Spec §4.F: "When patch body is empty (no change at upstream), emit a
/// header + `+++ target` + `--- /dev/null` skeleton so apply still
/// registers the renamed target path."
fn empty_patch_skeleton(target: &RelFile) -> String {
    format!("diff --git a/{target} b/{target}\n+++ b/{target}\n--- /dev/null\n")
}

fn join_with_trailing_newline(lines: &[String]) -> String {
    let mut s = lines.join("\n");
    s.push('\n');
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_file_patch_rewrites_plus_plus_plus_to_target() {
        let raw = "diff --git a/dev/null b/src.txt\nindex 0000000..1234567 100644\n--- /dev/null\n+++ b/src.txt\n@@ -0,0 +1 @@\n+hello\n";
        let target = RelFile::new("dest.txt");
        let rewritten = new_file_patch(raw, &target);
        assert!(rewritten.contains("+++ b/dest.txt"));
        assert!(rewritten.contains("--- /dev/null"));
        assert!(rewritten.contains("+hello"));
    }

    #[test]
    fn existing_file_patch_rewrites_both_sides() {
        let raw = "diff --git a/src.txt b/src.txt\nindex 1111111..2222222 100644\n--- a/src.txt\n+++ b/src.txt\n@@ -1 +1 @@\n-old\n+new\n";
        let target = RelFile::new("dest.txt");
        let rewritten = existing_file_patch(raw, &target);
        assert!(rewritten.starts_with("diff --git a/dest.txt b/dest.txt\n"));
        assert!(rewritten.contains("--- a/dest.txt"));
        assert!(rewritten.contains("+++ b/dest.txt"));
    }

    #[test]
    fn empty_existing_diff_emits_skeleton() {
        let raw = "diff --git a/src.txt b/src.txt\nindex 1111111..1111111 100644\n--- a/src.txt\n+++ b/src.txt\n";
        let target = RelFile::new("dest.txt");
        let rewritten = existing_file_patch(raw, &target);
        assert_eq!(
            rewritten,
            "diff --git a/dest.txt b/dest.txt\n+++ b/dest.txt\n--- /dev/null\n"
        );
    }
}
