//! Platform cache directory (spec §4.E).
//!
//! Resolved once per process via [`dirs::cache_dir`], the same
//! convention-over-invention choice the teacher makes for its own
//! cross-platform config discovery: no example in the retrieved pack
//! re-derives `$XDG_CACHE_HOME` by hand, so this pulls in the small,
//! widely used `dirs` crate rather than hand-rolling the per-OS logic.

use crate::path::{AbsDir, Remote};

const CACHE_NAMESPACE: &str = "mirror";

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("could not determine a user cache directory for this platform")]
    Unavailable,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// `<user-cache>/mirror`, created if absent.
pub fn root() -> Result<AbsDir, CacheError> {
    let base = dirs::cache_dir().ok_or(CacheError::Unavailable)?;
    let root = base.join(CACHE_NAMESPACE);
    std::fs::create_dir_all(&root)?;
    let utf8 = camino::Utf8PathBuf::from_path_buf(root)
        .map_err(|p| std::io::Error::other(format!("non-UTF-8 cache path: {}", p.display())))?;
    Ok(AbsDir::new(utf8.as_str()))
}

/// The working-tree slot for `remote`: `cache_root/<hex hash>`.
pub fn slot_for(cache_root: &AbsDir, remote: &Remote) -> AbsDir {
    let dir = crate::path::RelDir::new(remote.hash());
    cache_root / &dir
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_is_deterministic_for_equivalent_remotes() {
        let root = AbsDir::new("/tmp/mirror-cache");
        let a = Remote::new("https://example.com/repo/");
        let b = Remote::new("https://example.com/repo");
        assert_eq!(slot_for(&root, &a).as_path(), slot_for(&root, &b).as_path());
    }
}
