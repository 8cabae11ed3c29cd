//! Thin façade over the `git` binary (spec §4.B).
//!
//! Exposes exactly the operations the rest of the crate needs — clone,
//! fetch+reset, tree/blob lookup, the two diff shapes, three-way apply,
//! add, hash-object — as a stateless set of functions over an `AbsDir`
//! working tree. Modelled on the teacher's `core::git::GitEngine`
//! (subprocess spawn, stdin-piped patch, stderr-driven classification) but
//! re-targeted at Mirror's operation set instead of `GitEngine::apply`.
//! Every child process has `GIT_*` environment variables stripped, exactly
//! as the original's `GitHelper.run_command` filters `os.environ`.

use std::io::Write;
use std::process::{Command, Stdio};

use thiserror::Error;

use crate::path::{AbsDir, Commit, RelFile, Remote};

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("failed to spawn `git {0}`: {1}")]
    Spawn(String, std::io::Error),

    #[error("`git {args}` failed (status {status}): {stderr}")]
    CommandFailed {
        args: String,
        status: i32,
        stderr: String,
    },

    #[error("output of `git {0}` was not valid UTF-8")]
    InvalidUtf8(String),
}

/// What `source` resolves to inside a tree (spec §4.F step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Missing,
    Regular,
    Directory,
    Other,
}

/// Outcome of a three-way patch application. `git apply -3` exits non-zero
/// both when it could not apply at all *and* when it merged but left
/// conflict markers in the working tree (spec §4.B: "succeeds on
/// conflict-free apply, records conflict markers otherwise") — the two are
/// told apart by whether the target file now actually contains markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStatus {
    /// Patch applied with no conflicts.
    Clean,
    /// Patch applied via three-way merge; the file contains conflict markers.
    Conflicted,
    /// The patch did not apply at all.
    Failed,
}

#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub status: ApplyStatus,
    pub stderr: String,
}

struct Output {
    stdout: Vec<u8>,
    stderr: String,
    status: i32,
}

fn run(local: &AbsDir, args: &[&str], stdin: Option<&[u8]>) -> Result<Output, VcsError> {
    let joined = args.join(" ");
    let env_vars: Vec<(String, String)> = std::env::vars()
        .filter(|(key, _)| !key.starts_with("GIT_"))
        .collect();

    let mut cmd = Command::new("git");
    cmd.args(args)
        .current_dir(local.as_path())
        .env_clear()
        .envs(env_vars)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| VcsError::Spawn(joined.clone(), e))?;

    if let Some(bytes) = stdin
        && let Some(mut pipe) = child.stdin.take()
    {
        let _ = pipe.write_all(bytes);
    }

    let output = child
        .wait_with_output()
        .map_err(|e| VcsError::Spawn(joined.clone(), e))?;

    Ok(Output {
        stdout: output.stdout,
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        status: output.status.code().unwrap_or(-1),
    })
}

fn run_text(local: &AbsDir, args: &[&str], stdin: Option<&[u8]>) -> Result<String, VcsError> {
    let joined = args.join(" ");
    let out = run(local, args, stdin)?;
    if out.status != 0 {
        return Err(VcsError::CommandFailed {
            args: joined,
            status: out.status,
            stderr: out.stderr,
        });
    }
    String::from_utf8(out.stdout).map_err(|_| VcsError::InvalidUtf8(joined))
}

/// True if `dir` is (inside) a git working tree, used by the CLI entry
/// point to surface [`crate::error::MirrorError::NotARepository`] before
/// anything else runs.
pub fn is_repository(dir: &AbsDir) -> bool {
    run(dir, &["rev-parse", "--is-inside-work-tree"], None)
        .map(|out| out.status == 0)
        .unwrap_or(false)
}

/// Full clone of `remote` into `local` (which must not yet exist).
pub fn clone(remote: &Remote, local: &AbsDir) -> Result<(), VcsError> {
    let canonical = remote.canonical();
    run_text(
        &parent_of(local),
        &["clone", "--", &canonical, local.as_path().as_str()],
        None,
    )?;
    Ok(())
}

/// Run inside the intended parent of `local`, since `local` doesn't exist yet.
fn parent_of(local: &AbsDir) -> AbsDir {
    match local.as_path().parent() {
        Some(p) => AbsDir::new(p.as_str()),
        None => local.clone(),
    }
}

/// Fetch the tracked upstream and hard-reset working tree, index, and HEAD
/// to the fetched commit.
pub fn fetch_and_reset_head(local: &AbsDir) -> Result<Commit, VcsError> {
    run_text(local, &["fetch"], None)?;
    let target = match run_text(
        local,
        &["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"],
        None,
    ) {
        Ok(upstream) => upstream.trim().to_string(),
        Err(_) => "FETCH_HEAD".to_string(),
    };
    let sha = run_text(local, &["rev-parse", &target], None)?
        .trim()
        .to_string();
    run_text(local, &["reset", "--hard", &sha], None)?;
    Ok(Commit::new(sha))
}

/// The commit currently checked out at HEAD.
pub fn head_commit(local: &AbsDir) -> Result<Commit, VcsError> {
    let sha = run_text(local, &["rev-parse", "HEAD"], None)?
        .trim()
        .to_string();
    Ok(Commit::new(sha))
}

fn tree_ish(commit: Option<&Commit>) -> String {
    match commit {
        Some(c) => c.sha().to_string(),
        None => "HEAD".to_string(),
    }
}

/// What kind of object `file` is at `commit` (or HEAD).
pub fn file_kind(
    local: &AbsDir,
    commit: Option<&Commit>,
    file: &RelFile,
) -> Result<FileKind, VcsError> {
    let spec = format!("{}:{}", tree_ish(commit), file.as_path());
    let out = run(local, &["cat-file", "-t", &spec], None)?;
    if out.status != 0 {
        return Ok(FileKind::Missing);
    }
    let kind = String::from_utf8_lossy(&out.stdout).trim().to_string();
    Ok(match kind.as_str() {
        "blob" => FileKind::Regular,
        "tree" => FileKind::Directory,
        _ => FileKind::Other,
    })
}

/// Raw file content at `commit`.
pub fn blob(local: &AbsDir, commit: &Commit, file: &RelFile) -> Result<Vec<u8>, VcsError> {
    let spec = format!("{}:{}", commit.sha(), file.as_path());
    let out = run(local, &["cat-file", "-p", &spec], None)?;
    if out.status != 0 {
        return Err(VcsError::CommandFailed {
            args: format!("cat-file -p {spec}"),
            status: out.status,
            stderr: out.stderr,
        });
    }
    Ok(out.stdout)
}

/// Diff of an on-disk file against `/dev/null` (a "new file" patch).
pub fn diff_to_devnull(local: &AbsDir, file: &RelFile) -> Result<String, VcsError> {
    let path = file.as_path().as_str();
    // `git diff --no-index` exits 1 when there are differences; that's the
    // expected path here, not a failure.
    let out = run(
        local,
        &["diff", "--no-index", "--full-index", "--", "/dev/null", path],
        None,
    )?;
    if out.status != 0 && out.status != 1 {
        return Err(VcsError::CommandFailed {
            args: "diff --no-index".to_string(),
            status: out.status,
            stderr: out.stderr,
        });
    }
    String::from_utf8(out.stdout).map_err(|_| VcsError::InvalidUtf8("diff --no-index".into()))
}

/// Working-tree file vs `commit`.
pub fn diff_from_commit(
    local: &AbsDir,
    commit: &Commit,
    file: &RelFile,
) -> Result<String, VcsError> {
    let path = file.as_path().as_str();
    let out = run(
        local,
        &["diff", "--full-index", commit.sha(), "--", path],
        None,
    )?;
    if out.status != 0 && out.status != 1 {
        return Err(VcsError::CommandFailed {
            args: "diff".to_string(),
            status: out.status,
            stderr: out.stderr,
        });
    }
    String::from_utf8(out.stdout).map_err(|_| VcsError::InvalidUtf8("diff".into()))
}

/// Apply a unified patch with three-way merging against `target`. A
/// non-zero exit is only a real failure if `target` doesn't end up holding
/// conflict markers — otherwise `git apply -3` did its job and left the
/// conflict for the caller to report, not abort on.
pub fn apply_three_way(
    local: &AbsDir,
    patch: &str,
    allow_empty: bool,
    target: &RelFile,
) -> Result<ApplyOutcome, VcsError> {
    let mut args = vec!["apply", "-3", "--index"];
    if allow_empty {
        args.insert(1, "--allow-empty");
    }
    args.push("-");
    let out = run(local, &args, Some(patch.as_bytes()))?;
    let status = if out.status == 0 {
        ApplyStatus::Clean
    } else if has_conflict_markers(local, target) {
        ApplyStatus::Conflicted
    } else {
        ApplyStatus::Failed
    };
    Ok(ApplyOutcome {
        status,
        stderr: out.stderr,
    })
}

/// Stage files.
pub fn add(local: &AbsDir, files: &[RelFile]) -> Result<(), VcsError> {
    let mut args = vec!["add"];
    let paths: Vec<&str> = files.iter().map(|f| f.as_path().as_str()).collect();
    args.extend(paths.iter().copied());
    run_text(local, &args, None)?;
    Ok(())
}

/// Insert a blob into the object database so three-way merge can find the
/// base (spec §4.F: "Insert the base blob ... via `hash_object`").
pub fn hash_object(local: &AbsDir, bytes: &[u8]) -> Result<(), VcsError> {
    run(local, &["hash-object", "--stdin", "-w"], Some(bytes))?;
    Ok(())
}

/// True if `path` (relative to `local`) contains unresolved conflict
/// markers, scanning line-by-line the way
/// `crate::core::conflict::parse_conflicts` detects `<<<<<<<`/`=======`/
/// `>>>>>>>` runs — ported down to a yes/no check since Mirror only reports
/// conflicts, it never auto-resolves them.
pub fn has_conflict_markers(local: &AbsDir, file: &RelFile) -> bool {
    let abs = local.as_path().join(file.as_path());
    let Ok(content) = std::fs::read(abs) else {
        return false;
    };
    content
        .split(|&b| b == b'\n')
        .any(|line| starts_with_n(line, b'<') || starts_with_n(line, b'>'))
}

fn starts_with_n(line: &[u8], ch: u8) -> bool {
    line.len() >= 7 && line[..7].iter().all(|&b| b == ch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn init_repo(dir: &std::path::Path) {
        let run = |args: &[&str]| {
            std::process::Command::new("git")
                .args(args)
                .current_dir(dir)
                .status()
                .unwrap();
        };
        run(&["init", "-q"]);
        run(&["config", "user.email", "test@example.com"]);
        run(&["config", "user.name", "test"]);
    }

    #[test]
    fn head_commit_reads_current_sha() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        fs::write(dir.path().join("a.txt"), "hello").unwrap();
        std::process::Command::new("git")
            .args(["add", "a.txt"])
            .current_dir(dir.path())
            .status()
            .unwrap();
        std::process::Command::new("git")
            .args(["commit", "-q", "-m", "init"])
            .current_dir(dir.path())
            .status()
            .unwrap();

        let abs = AbsDir::new(dir.path().to_str().unwrap());
        let commit = head_commit(&abs).unwrap();
        assert_eq!(commit.sha().len(), 40);
    }

    #[test]
    fn file_kind_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        fs::write(dir.path().join("a.txt"), "hello").unwrap();
        std::process::Command::new("git")
            .args(["add", "a.txt"])
            .current_dir(dir.path())
            .status()
            .unwrap();
        std::process::Command::new("git")
            .args(["commit", "-q", "-m", "init"])
            .current_dir(dir.path())
            .status()
            .unwrap();

        let abs = AbsDir::new(dir.path().to_str().unwrap());
        let kind = file_kind(&abs, None, &RelFile::new("missing.txt")).unwrap();
        assert_eq!(kind, FileKind::Missing);
        let kind = file_kind(&abs, None, &RelFile::new("a.txt")).unwrap();
        assert_eq!(kind, FileKind::Regular);
    }

    #[test]
    fn conflict_markers_detected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        fs::write(&file, "<<<<<<< ours\na\n=======\nb\n>>>>>>> theirs\n").unwrap();
        let abs = AbsDir::new(dir.path().to_str().unwrap());
        assert!(has_conflict_markers(&abs, &RelFile::new("f.txt")));
    }

    fn git(dir: &std::path::Path, args: &[&str]) {
        let status = std::process::Command::new("git")
            .args(args)
            .current_dir(dir)
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?} failed");
    }

    /// `git apply -3` exits non-zero both when it genuinely fails *and* when
    /// it completes a three-way merge with conflict markers left behind —
    /// this must distinguish the two (spec §4.B).
    #[test]
    fn apply_three_way_reports_conflicted_not_failed_on_genuine_conflict() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let abs = AbsDir::new(dir.path().to_str().unwrap());
        let target = RelFile::new("f.txt");

        fs::write(dir.path().join("f.txt"), "line1\nline2\nline3\n").unwrap();
        git(dir.path(), &["add", "f.txt"]);
        git(dir.path(), &["commit", "-q", "-m", "base"]);
        let base_commit = head_commit(&abs).unwrap();

        fs::write(dir.path().join("f.txt"), "line1\nupstream\nline3\n").unwrap();
        git(dir.path(), &["commit", "-aqm", "upstream change"]);

        let patch = diff_from_commit(&abs, &base_commit, &target).unwrap();

        // The local working copy edits the same line the patch changes, so
        // the three-way merge cannot reconcile them automatically.
        fs::write(dir.path().join("f.txt"), "line1\nlocal\nline3\n").unwrap();
        git(dir.path(), &["add", "f.txt"]);

        let outcome = apply_three_way(&abs, &patch, true, &target).unwrap();
        assert_eq!(outcome.status, ApplyStatus::Conflicted);

        let merged = fs::read_to_string(dir.path().join("f.txt")).unwrap();
        assert!(merged.contains("<<<<<<<"));
        assert!(merged.contains(">>>>>>>"));
    }

    #[test]
    fn apply_three_way_reports_failed_when_patch_does_not_apply() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let abs = AbsDir::new(dir.path().to_str().unwrap());

        // Targets a file that doesn't exist anywhere in the tree or its
        // history, so there is no base for a three-way merge to fall back
        // to: this is a genuine apply failure, not a reconcilable conflict.
        let bogus_patch = "diff --git a/missing.txt b/missing.txt\n\
            index 0000000..1111111 100644\n\
            --- a/missing.txt\n\
            +++ b/missing.txt\n\
            @@ -1,3 +1,3 @@\n\
            -alpha\n-beta\n-gamma\n+delta\n+epsilon\n+zeta\n";

        let outcome =
            apply_three_way(&abs, bogus_patch, false, &RelFile::new("missing.txt")).unwrap();
        assert_eq!(outcome.status, ApplyStatus::Failed);
    }

    #[test]
    fn is_repository_true_inside_work_tree_false_outside() {
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path());
        let abs = AbsDir::new(dir.path().to_str().unwrap());
        assert!(is_repository(&abs));

        let plain = tempfile::tempdir().unwrap();
        let abs = AbsDir::new(plain.path().to_str().unwrap());
        assert!(!is_repository(&abs));
    }
}
