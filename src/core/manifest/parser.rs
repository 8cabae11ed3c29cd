//! Manifest grammar and validation (spec §4.D).
//!
//! Parses with `saphyr` rather than `serde_yaml`: its marked AST
//! (`MarkedYaml`/`Marker`) carries a line/column for every node, which is
//! exactly what per-node diagnostics need. `serde_yaml` would hand back a
//! plain `MirrorConfig` with no way to point at the offending line.
//!
//! `saphyr`'s composer already rejects a YAML document whose anchors form a
//! cycle (the same check PyYAML's `Composer.compose_node` does by tracking
//! "nodes currently being composed"), so recursive-reference rejection is a
//! translation of that error rather than a second implementation of cycle
//! detection here.
//!
//! An explicit breadcrumb stack (`ctx`) is threaded through every parsing
//! function instead of installing per-method wrappers, per Design Note 9's
//! resolution of the original's implicit "current node" stack.

use indexmap::IndexMap;
use saphyr::{MarkedYaml, Marker, ScanError, YamlData};

use crate::path::{RelFile, Remote};

use super::error::ParseError;
use super::model::{FileSpec, MirrorConfig, RepoSpec};

type Node = MarkedYaml;

const REPO_KEYS: &[&str] = &["source", "files"];

/// Parse `source_text` (read from `file`, used only for error messages).
pub fn parse(file: &str, source_text: &str) -> Result<MirrorConfig, ParseError> {
    let docs = MarkedYaml::load_from_str(source_text)
        .map_err(|e| scan_error(file, source_text, &e))?;
    let root = docs.into_iter().next().ok_or_else(|| {
        ParseError::new(
            file,
            source_text,
            1,
            1,
            "empty document",
            "the manifest is empty; expected a mapping with a `repos` key",
            None,
        )
    })?;

    let mut ctx: Vec<String> = vec!["<root>".to_string()];
    let repos_node = require_key(file, source_text, &root, "repos", &mut ctx)?;
    let repo_nodes = expect_nonempty_sequence(file, source_text, repos_node, "repos", &ctx)?;

    let mut repos = Vec::with_capacity(repo_nodes.len());
    let mut seen_sources: IndexMap<String, Marker> = IndexMap::new();
    let mut seen_targets: IndexMap<String, Marker> = IndexMap::new();

    for (i, repo_node) in repo_nodes.iter().enumerate() {
        ctx.push(format!("repos[{i}]"));
        let repo = parse_repo(file, source_text, repo_node, &mut ctx)?;

        let source_key = repo.source.canonical();
        if let Some(prior) = seen_sources.get(&source_key) {
            return Err(duplicate(file, source_text, repo_node, prior, "source", &source_key));
        }
        seen_sources.insert(source_key, marker_of(repo_node));

        for file_spec in &repo.files {
            let target_key = file_spec.target.canonical();
            if let Some(prior) = seen_targets.get(&target_key) {
                return Err(duplicate(
                    file,
                    source_text,
                    repo_node,
                    prior,
                    "target",
                    &target_key,
                ));
            }
            seen_targets.insert(target_key, marker_of(repo_node));
        }

        repos.push(repo);
        ctx.pop();
    }

    Ok(MirrorConfig { repos })
}

fn parse_repo(
    file: &str,
    source_text: &str,
    node: &Node,
    ctx: &mut Vec<String>,
) -> Result<RepoSpec, ParseError> {
    validate_mapping(file, source_text, node, REPO_KEYS, REPO_KEYS, ctx)?;

    let source_node = require_key(file, source_text, node, "source", ctx)?;
    let source_str = expect_string(file, source_text, source_node, "source", ctx)?;
    if source_str.trim() == "." || source_str.trim().is_empty() {
        return Err(error_at(
            file,
            source_text,
            source_node,
            "invalid remote",
            "a repo's `source` must not be empty or `.`",
            None,
        ));
    }
    let source = Remote::new(source_str);

    let files_node = require_key(file, source_text, node, "files", ctx)?;
    let file_nodes = expect_nonempty_sequence(file, source_text, files_node, "files", ctx)?;

    let mut files = Vec::with_capacity(file_nodes.len());
    for (i, fnode) in file_nodes.iter().enumerate() {
        ctx.push(format!("files[{i}]"));
        files.push(parse_filespec(file, source_text, fnode, ctx)?);
        ctx.pop();
    }

    Ok(RepoSpec { source, files })
}

/// `filespec := string | mapping { string: string }` (single entry only).
fn parse_filespec(
    file: &str,
    source_text: &str,
    node: &Node,
    ctx: &mut Vec<String>,
) -> Result<FileSpec, ParseError> {
    match &node.data {
        YamlData::String(s) => {
            let rel = validate_relpath(file, source_text, node, s, ctx)?;
            Ok(FileSpec {
                source: rel.clone(),
                target: rel,
            })
        }
        YamlData::Hash(h) => {
            let pairs: Vec<_> = h.iter().collect();
            if pairs.len() != 1 {
                return Err(error_at(
                    file,
                    source_text,
                    node,
                    "malformed file entry",
                    "a mapping file entry must have exactly one `target: source` pair",
                    None,
                ));
            }
            let (target_node, source_node) = pairs[0];
            let target_str = expect_string(file, source_text, target_node, "target", ctx)?;
            let source_str = expect_string(file, source_text, source_node, "source", ctx)?;
            let target = validate_relpath(file, source_text, target_node, target_str, ctx)?;
            let source = validate_relpath(file, source_text, source_node, source_str, ctx)?;
            Ok(FileSpec { source, target })
        }
        _ => Err(error_at(
            file,
            source_text,
            node,
            "malformed file entry",
            "a file entry must be a string or a single-entry `target: source` mapping",
            None,
        )),
    }
}

fn validate_relpath(
    file: &str,
    source_text: &str,
    node: &Node,
    raw: &str,
    _ctx: &[String],
) -> Result<RelFile, ParseError> {
    let rel = RelFile::new(raw);
    let normalized = rel.canonical();
    if normalized.is_empty() || normalized == "." || normalized.starts_with("..") {
        return Err(error_at(
            file,
            source_text,
            node,
            "path escapes the repository",
            format!("'{raw}' must be a non-empty path inside the repository"),
            None,
        ));
    }
    Ok(rel)
}

/// Validate a mapping's keys: every key is a string, no duplicates, no
/// unknown keys (with a "did you mean" suggestion), all `required` present.
fn validate_mapping(
    file: &str,
    source_text: &str,
    node: &Node,
    allowed: &[&str],
    required: &[&str],
    ctx: &mut Vec<String>,
) -> Result<(), ParseError> {
    let pairs = match &node.data {
        YamlData::Hash(h) => h.iter().collect::<Vec<_>>(),
        _ => {
            return Err(error_at(
                file,
                source_text,
                node,
                "expected a mapping",
                format!("expected a mapping at {}", ctx.join(".")),
                None,
            ));
        }
    };

    let mut seen: IndexMap<&str, &Node> = IndexMap::new();
    for (key_node, _value_node) in &pairs {
        let key = match &key_node.data {
            YamlData::String(s) => s.as_str(),
            _ => {
                return Err(error_at(
                    file,
                    source_text,
                    key_node,
                    "non-string key",
                    "mapping keys must be strings",
                    None,
                ));
            }
        };

        if let Some(prior) = seen.get(key) {
            return Err(duplicate(file, source_text, key_node, &marker_of(prior), "key", key));
        }
        if !allowed.contains(&key) {
            let suggestion = closest_match(key, allowed);
            let help = suggestion.map(|s| format!("did you mean `{s}`?"));
            return Err(error_at(
                file,
                source_text,
                key_node,
                "unknown key",
                format!(
                    "unknown key `{key}`; expected one of: {}",
                    allowed.join(", ")
                ),
                help,
            ));
        }
        seen.insert(key, key_node);
    }

    for req in required {
        if !seen.contains_key(req) {
            return Err(error_at(
                file,
                source_text,
                node,
                "missing key",
                format!("missing required key `{req}`"),
                None,
            ));
        }
    }

    Ok(())
}

fn require_key<'a>(
    file: &str,
    source_text: &str,
    node: &'a Node,
    key: &str,
    ctx: &mut Vec<String>,
) -> Result<&'a Node, ParseError> {
    let pairs = match &node.data {
        YamlData::Hash(h) => h,
        _ => {
            return Err(error_at(
                file,
                source_text,
                node,
                "expected a mapping",
                format!("expected a mapping at {}", ctx.join(".")),
                None,
            ));
        }
    };
    for (key_node, value_node) in pairs.iter() {
        if let YamlData::String(s) = &key_node.data
            && s == key
        {
            return Ok(value_node);
        }
    }
    Err(error_at(
        file,
        source_text,
        node,
        "missing key",
        format!("missing required key `{key}`"),
        None,
    ))
}

fn expect_string<'a>(
    file: &str,
    source_text: &str,
    node: &'a Node,
    what: &str,
    _ctx: &[String],
) -> Result<&'a str, ParseError> {
    match &node.data {
        YamlData::String(s) => Ok(s.as_str()),
        _ => Err(error_at(
            file,
            source_text,
            node,
            "expected a string",
            format!("`{what}` must be a string"),
            None,
        )),
    }
}

fn expect_nonempty_sequence<'a>(
    file: &str,
    source_text: &str,
    node: &'a Node,
    what: &str,
    _ctx: &[String],
) -> Result<&'a Vec<Node>, ParseError> {
    match &node.data {
        YamlData::Array(items) if !items.is_empty() => Ok(items),
        YamlData::Array(_) => Err(error_at(
            file,
            source_text,
            node,
            "empty sequence",
            format!("`{what}` must not be empty"),
            None,
        )),
        _ => Err(error_at(
            file,
            source_text,
            node,
            "expected a sequence",
            format!("`{what}` must be a sequence"),
            None,
        )),
    }
}

fn marker_of(node: &Node) -> Marker {
    node.span.start
}

fn error_at(
    file: &str,
    source_text: &str,
    node: &Node,
    label: impl Into<String>,
    message: impl Into<String>,
    help: Option<String>,
) -> ParseError {
    let marker = marker_of(node);
    ParseError::new(
        file,
        source_text,
        marker.line(),
        marker.col() + 1,
        label,
        message,
        help,
    )
}

fn duplicate(
    file: &str,
    source_text: &str,
    node: &Node,
    prior: &Marker,
    what: &str,
    value: &str,
) -> ParseError {
    error_at(
        file,
        source_text,
        node,
        format!("duplicate {what}"),
        format!(
            "duplicate {what} '{value}' (first seen at line {})",
            prior.line()
        ),
        None,
    )
}

fn scan_error(file: &str, source_text: &str, e: &ScanError) -> ParseError {
    let marker = *e.marker();
    ParseError::new(
        file,
        source_text,
        marker.line(),
        marker.col() + 1,
        "invalid YAML",
        e.to_string(),
        None,
    )
}

/// Smallest-edit-distance candidate from `allowed`, matching the
/// `difflib.get_close_matches` heuristic the original config parser uses
/// for "did you mean" suggestions.
fn closest_match(key: &str, allowed: &[&str]) -> Option<&'static str> {
    allowed
        .iter()
        .map(|candidate| (levenshtein(key, candidate), *candidate))
        .filter(|(distance, _)| *distance <= 2)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| candidate)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut prev = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let tmp = row[j + 1];
            row[j + 1] = if ca == cb {
                prev
            } else {
                1 + prev.min(row[j]).min(row[j + 1])
            };
            prev = tmp;
        }
    }
    row[b.len()]
}
