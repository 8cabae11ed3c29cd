//! User-visible error taxonomy (spec §7).
//!
//! Each variant is one failure kind a `check`/`install`/`sync` run can
//! surface. Variants that carry a meaningful source location implement
//! [`miette::Diagnostic`] so the CLI can render them with `ariadne`-style
//! context the same way [`crate::manifest::ParseError`] does; the rest are
//! plain one-line messages, matching the original's `check_for_errors`
//! behaviour of logging `{type}: {message}` and exiting 1.

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::path::Remote;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("{0} is not a git repository; run `git init` first")]
    NotARepository(Utf8PathBuf),

    #[error("Mirror is already installed here (found {0})")]
    AlreadyInstalled(Utf8PathBuf),

    #[error("Mirror is not installed here (missing {0}); run `mirror install` first")]
    NotInstalled(Utf8PathBuf),

    #[error("another mirror process is already using {0}")]
    InUse(Utf8PathBuf),

    #[error(transparent)]
    Parser(#[from] crate::manifest::ParseError),

    #[error("'{path}' does not exist in {remote}")]
    MissingFile { remote: Remote, path: Utf8PathBuf },

    #[error("'{path}' is a directory in {remote}, not a file")]
    IsADirectory { remote: Remote, path: Utf8PathBuf },

    #[error("'{path}' exists in {remote} but is not a regular file")]
    IrregularFile { remote: Remote, path: Utf8PathBuf },

    #[error("unable to checkout {0}: clone, fetch, and re-clone all failed")]
    CheckoutUnavailable(Remote),

    #[error("timed out waiting for the leader to finish checking out {0}")]
    WaitTimeout(Remote),

    #[error("could not compute a diff for '{path}' in {remote}: {reason}")]
    DiffFailure {
        remote: Remote,
        path: Utf8PathBuf,
        reason: String,
    },

    #[error("could not apply the change to '{path}' from {remote}: {reason}")]
    ApplyFailure {
        remote: Remote,
        path: Utf8PathBuf,
        reason: String,
    },

    #[error("could not load the lock file at {0}: {1}")]
    StateLoadError(Utf8PathBuf, String),

    #[error(transparent)]
    Vcs(#[from] crate::vcs::VcsError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MirrorError>;
