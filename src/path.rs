//! Typed paths distinguishing relative/absolute files and directories.
//!
//! Four nominal types — [`RelFile`], [`RelDir`], [`AbsFile`], [`AbsDir`] —
//! compose only in the combinations that make sense (`AbsDir / RelFile` →
//! `AbsFile`, etc.) via `std::ops::Div`; any other combination is rejected at
//! compile time rather than at runtime. `Remote` and `Commit` live here too,
//! since both are small value types shared across the rest of the crate.

use std::fmt;
use std::ops::Div;

use blake2::{Blake2b512, Digest};
use camino::{Utf8Path, Utf8PathBuf};

/// A path relative to the downstream repository root, naming a file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelFile(Utf8PathBuf);

/// A path relative to the downstream repository root, naming a directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelDir(Utf8PathBuf);

/// An absolute path naming a file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AbsFile(Utf8PathBuf);

/// An absolute path naming a directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AbsDir(Utf8PathBuf);

impl RelFile {
    /// Build from a raw (possibly un-normalised) relative path string.
    pub fn new(path: impl AsRef<str>) -> Self {
        Self(Utf8PathBuf::from(path.as_ref()))
    }

    pub fn as_path(&self) -> &Utf8Path {
        &self.0
    }

    /// Lexical `..`/`.` normalisation, without touching the filesystem.
    pub fn canonical(&self) -> String {
        normalize_lexically(&self.0)
    }
}

impl RelDir {
    pub fn new(path: impl AsRef<str>) -> Self {
        Self(Utf8PathBuf::from(path.as_ref()))
    }

    pub fn as_path(&self) -> &Utf8Path {
        &self.0
    }
}

impl AbsFile {
    pub fn new(path: impl AsRef<str>) -> Self {
        Self(Utf8PathBuf::from(path.as_ref()))
    }

    pub fn as_path(&self) -> &Utf8Path {
        &self.0
    }

    pub fn exists(&self) -> bool {
        self.0.as_std_path().exists()
    }

    pub fn is_file(&self) -> bool {
        self.0.as_std_path().is_file()
    }
}

impl AbsDir {
    pub fn new(path: impl AsRef<str>) -> Self {
        Self(Utf8PathBuf::from(path.as_ref()))
    }

    pub fn cwd() -> std::io::Result<Self> {
        let cwd = std::env::current_dir()?;
        let utf8 = Utf8PathBuf::from_path_buf(cwd)
            .map_err(|p| std::io::Error::other(format!("non-UTF-8 cwd: {}", p.display())))?;
        Ok(Self(utf8))
    }

    pub fn as_path(&self) -> &Utf8Path {
        &self.0
    }

    pub fn exists(&self) -> bool {
        self.0.as_std_path().exists()
    }

    pub fn is_dir(&self) -> bool {
        self.0.as_std_path().is_dir()
    }

    /// A sibling file next to this directory, formed by string suffix (used
    /// for `<cache_slot>.sem` / `<cache_slot>.sync`, which live beside the
    /// slot directory rather than inside it).
    pub fn sibling_file(&self, suffix: &str) -> AbsFile {
        let mut s = self.0.to_string();
        s.push_str(suffix);
        AbsFile(Utf8PathBuf::from(s))
    }
}

impl fmt::Display for RelFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RelDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for AbsFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for AbsDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn join(base: &Utf8Path, suffix: &Utf8Path) -> Utf8PathBuf {
    base.join(suffix)
}

impl Div<&RelFile> for &AbsDir {
    type Output = AbsFile;
    fn div(self, rhs: &RelFile) -> AbsFile {
        AbsFile(join(&self.0, &rhs.0))
    }
}

impl Div<&RelDir> for &AbsDir {
    type Output = AbsDir;
    fn div(self, rhs: &RelDir) -> AbsDir {
        AbsDir(join(&self.0, &rhs.0))
    }
}

impl Div<&RelFile> for &RelDir {
    type Output = RelFile;
    fn div(self, rhs: &RelFile) -> RelFile {
        RelFile(join(&self.0, &rhs.0))
    }
}

impl Div<&RelDir> for &RelDir {
    type Output = RelDir;
    fn div(self, rhs: &RelDir) -> RelDir {
        RelDir(join(&self.0, &rhs.0))
    }
}

/// Normalise `.`/`..` components lexically (no filesystem access). A leading
/// `..` is preserved so callers can detect repository escapes.
fn normalize_lexically(path: &Utf8Path) -> String {
    use camino::Utf8Component;

    let mut out: Vec<&str> = Vec::new();
    for component in path.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => match out.last() {
                Some(top) if *top != ".." => {
                    out.pop();
                }
                _ => out.push(".."),
            },
            Utf8Component::Normal(s) => out.push(s),
            Utf8Component::RootDir | Utf8Component::Prefix(_) => out.push(component.as_str()),
        }
    }
    if out.is_empty() {
        ".".to_string()
    } else {
        out.join("/")
    }
}

/// An upstream revision identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Commit {
    sha: String,
}

impl Commit {
    /// Characters of [`Commit::short`] shown to users.
    pub const DISPLAY_LENGTH: usize = 7;

    pub fn new(sha: impl Into<String>) -> Self {
        Self { sha: sha.into() }
    }

    pub fn sha(&self) -> &str {
        &self.sha
    }

    /// The abbreviated form used only for display, never for comparison.
    pub fn short(&self) -> &str {
        let end = self.sha.len().min(Self::DISPLAY_LENGTH);
        &self.sha[..end]
    }
}

impl fmt::Display for Commit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sha)
    }
}

/// An opaque remote specifier: a URL or a filesystem path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Remote {
    raw: String,
}

impl Remote {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    fn looks_like_url(&self) -> bool {
        self.raw.contains("://") || is_scp_like(&self.raw)
    }

    /// Deterministic representation used for equality/hashing/cache naming.
    /// Local filesystem paths are resolved to their real path (so `./x` and
    /// `x/` name the same cache slot); anything else is treated as an opaque
    /// string with trailing slashes trimmed.
    pub fn canonical(&self) -> String {
        if !self.looks_like_url() && Utf8Path::new(&self.raw).exists() {
            if let Ok(resolved) = dunce::canonicalize(&self.raw) {
                return resolved.to_string_lossy().into_owned();
            }
        }
        self.raw.trim_end_matches('/').to_string()
    }

    /// Idempotent: `Remote::new(r.canonical()).hash() == r.hash()`.
    pub fn hash(&self) -> String {
        let mut hasher = Blake2b512::new();
        hasher.update(self.canonical().as_bytes());
        let digest = hasher.finalize();
        hex_encode(&digest)
    }
}

impl fmt::Display for Remote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// `user@host:path` (no scheme, colon before any slash) — scp-style syntax
/// `git clone` accepts but which is not a local filesystem path.
fn is_scp_like(raw: &str) -> bool {
    let Some(at) = raw.find('@') else { return false };
    let rest = &raw[at + 1..];
    match rest.find(':') {
        Some(colon) => !rest[..colon].contains('/'),
        None => false,
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_abs_dir_rel_file() {
        let dir = AbsDir::new("/repo");
        let file = RelFile::new("src/main.rs");
        let composed = &dir / &file;
        assert_eq!(composed.as_path(), "/repo/src/main.rs");
    }

    #[test]
    fn compose_rel_dir_rel_dir() {
        let a = RelDir::new("a");
        let b = RelDir::new("b");
        let composed = &a / &b;
        assert_eq!(composed.as_path(), "a/b");
    }

    #[test]
    fn canonical_rejects_parent_escape() {
        let f = RelFile::new("../secret");
        assert!(f.canonical().starts_with(".."));
    }

    #[test]
    fn canonical_collapses_dot_segments() {
        let f = RelFile::new("./a/../b");
        assert_eq!(f.canonical(), "b");
    }

    #[test]
    fn remote_hash_stable_across_trailing_slash() {
        let a = Remote::new("https://example.com/repo");
        let b = Remote::new("https://example.com/repo/");
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn remote_hash_differs_for_distinct_remotes() {
        let a = Remote::new("https://example.com/repo-a");
        let b = Remote::new("https://example.com/repo-b");
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn scp_like_remote_detected() {
        let r = Remote::new("git@github.com:owner/repo.git");
        assert!(r.looks_like_url());
        assert_eq!(r.canonical(), "git@github.com:owner/repo.git");
    }

    #[test]
    fn commit_short_truncates_to_display_length() {
        let c = Commit::new("0123456789abcdef");
        assert_eq!(c.short(), "0123456");
        assert_eq!(c.short().len(), Commit::DISPLAY_LENGTH);
    }
}
