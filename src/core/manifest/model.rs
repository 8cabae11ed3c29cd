//! Validated, in-memory manifest shape (spec §3, §4.D grammar).
//!
//! Produced only by [`super::parser::parse`]; by the time a value of these
//! types exists, every invariant (`source` appears at most once,
//! `target`s are unique, no path escapes the repository root) has already
//! been checked.

use crate::path::{RelFile, Remote};

/// One mirrored file: `source` inside the upstream, `target` inside the
/// downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSpec {
    pub source: RelFile,
    pub target: RelFile,
}

/// One upstream repository and the files mirrored from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSpec {
    pub source: Remote,
    pub files: Vec<FileSpec>,
}

/// A fully parsed, validated manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    pub repos: Vec<RepoSpec>,
}
