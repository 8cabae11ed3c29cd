//! The lock file's on-disk shape: load/dump for [`MirrorState`] (spec §4.H).
//!
//! Hand-written, schema-directed loaders rather than a `serde`-derive
//! deserialization pass, per Design Note 9's rejection of the original's
//! dynamic-reflection loader: each record type gets an explicit "expect a
//! mapping with exactly these keys" check, the same shape
//! [`crate::manifest::parser`] uses for the manifest. Dumping is hand-rolled
//! string formatting rather than a generic YAML emitter, so the on-disk
//! ordering (manifest order, sorted file lists, block style) is guaranteed
//! rather than incidental to whatever an emitter's defaults happen to be.

use saphyr::{MarkedYaml, YamlData};
use thiserror::Error;

use crate::path::{Commit, RelFile, Remote};

const HEADER: &str =
    "# DANGER: EDIT AT YOUR OWN RISK. This file is maintained by mirror; hand edits may be lost or silently corrupt the mirrored state.\n";

const REPO_KEYS: &[&str] = &["source", "commit", "files"];

#[derive(Debug, Error)]
pub enum StateError {
    #[error("{0}")]
    Malformed(String),
}

/// One upstream's recorded state: the commit downstream currently reflects,
/// and the sorted set of files mirrored from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoState {
    pub source: Remote,
    pub commit: Commit,
    pub files: Vec<RelFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MirrorState {
    pub repos: Vec<RepoState>,
}

impl MirrorState {
    pub fn empty() -> Self {
        Self { repos: Vec::new() }
    }

    pub fn load(text: &str) -> Result<Self, StateError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(Self::empty());
        }
        let docs = MarkedYaml::load_from_str(text)
            .map_err(|e| StateError::Malformed(format!("invalid YAML: {e}")))?;
        let Some(root) = docs.into_iter().next() else {
            return Ok(Self::empty());
        };

        let entries = match &root.data {
            YamlData::Array(items) => items,
            YamlData::Null => return Ok(Self::empty()),
            _ => return Err(StateError::Malformed("lock file must be a sequence".into())),
        };

        let mut repos = Vec::with_capacity(entries.len());
        let mut seen_sources: Vec<String> = Vec::new();

        for entry in entries {
            let repo = load_repo_state(entry)?;
            let key = repo.source.canonical();
            if seen_sources.contains(&key) {
                return Err(StateError::Malformed(format!(
                    "duplicate source '{key}' in lock file"
                )));
            }
            seen_sources.push(key);
            repos.push(repo);
        }

        Ok(Self { repos })
    }

    pub fn dump(&self) -> String {
        let mut out = String::from(HEADER);
        if self.repos.is_empty() {
            out.push_str("[]\n");
            return out;
        }
        for repo in &self.repos {
            out.push_str("- source: ");
            out.push_str(&quote_scalar(repo.source.raw()));
            out.push('\n');
            out.push_str("  commit: ");
            out.push_str(repo.commit.sha());
            out.push('\n');
            out.push_str("  files:\n");
            let mut files: Vec<&RelFile> = repo.files.iter().collect();
            files.sort();
            for f in files {
                out.push_str("    - ");
                out.push_str(&quote_scalar(f.as_path().as_str()));
                out.push('\n');
            }
        }
        out
    }
}

fn load_repo_state(node: &MarkedYaml) -> Result<RepoState, StateError> {
    let pairs = match &node.data {
        YamlData::Hash(h) => h.iter().collect::<Vec<_>>(),
        _ => return Err(StateError::Malformed("each lock entry must be a mapping".into())),
    };

    let mut source: Option<String> = None;
    let mut commit: Option<String> = None;
    let mut files: Option<Vec<String>> = None;

    for (key_node, value_node) in &pairs {
        let key = match &key_node.data {
            YamlData::String(s) => s.as_str(),
            _ => return Err(StateError::Malformed("mapping keys must be strings".into())),
        };
        if !REPO_KEYS.contains(&key) {
            return Err(StateError::Malformed(format!(
                "unknown key '{key}' in lock entry; expected one of: {}",
                REPO_KEYS.join(", ")
            )));
        }
        match key {
            "source" => source = Some(expect_scalar_string(value_node, "source")?),
            "commit" => commit = Some(expect_scalar_string(value_node, "commit")?),
            "files" => files = Some(expect_string_sequence(value_node, "files")?),
            _ => unreachable!(),
        }
    }

    let source = source.ok_or_else(|| StateError::Malformed("missing key 'source'".into()))?;
    let commit = commit.ok_or_else(|| StateError::Malformed("missing key 'commit'".into()))?;
    let files = files.ok_or_else(|| StateError::Malformed("missing key 'files'".into()))?;

    let mut sorted = files.clone();
    sorted.sort();
    if sorted != files {
        return Err(StateError::Malformed(format!(
            "'files' for source '{source}' is not sorted"
        )));
    }

    Ok(RepoState {
        source: Remote::new(source),
        commit: Commit::new(commit),
        files: files.into_iter().map(RelFile::new).collect(),
    })
}

fn expect_scalar_string(node: &MarkedYaml, what: &str) -> Result<String, StateError> {
    match &node.data {
        YamlData::String(s) => Ok(s.clone()),
        _ => Err(StateError::Malformed(format!("'{what}' must be a string"))),
    }
}

fn expect_string_sequence(node: &MarkedYaml, what: &str) -> Result<Vec<String>, StateError> {
    match &node.data {
        YamlData::Array(items) => items
            .iter()
            .map(|item| expect_scalar_string(item, what))
            .collect(),
        _ => Err(StateError::Malformed(format!("'{what}' must be a sequence"))),
    }
}

/// Quote a scalar only when plain-style emission would be ambiguous.
fn quote_scalar(s: &str) -> String {
    let needs_quoting = s.is_empty()
        || s.starts_with(|c: char| "!&*-?|>%@`\"'#,[]{}".contains(c))
        || s.contains(": ")
        || s.trim() != s;
    if needs_quoting {
        format!("{:?}", s)
    } else {
        s.to_string()
    }
}
