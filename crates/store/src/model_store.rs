//! Model storage provider: opaque blobs addressed by path.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Storage for checkpoint weights, sidecars and exported artifacts.
pub trait ModelStore: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    /// Size in bytes. Fails if the blob does not exist.
    fn size(&self, path: &Path) -> Result<u64>;

    /// Create a directory and its parents.
    fn ensure_dir(&self, dir: &Path) -> Result<()>;

    /// Entries directly under `dir`, sorted. Empty when `dir` is absent.
    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()>;

    fn read(&self, path: &Path) -> Result<Vec<u8>>;

    fn copy(&self, from: &Path, to: &Path) -> Result<()>;
}

/// [`ModelStore`] on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsModelStore;

impl ModelStore for FsModelStore {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn size(&self, path: &Path) -> Result<u64> {
        let meta = std::fs::metadata(path).with_context(|| format!("stat {}", path.display()))?;
        Ok(meta.len())
    }

    fn ensure_dir(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))
    }

    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut out: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("read directory {}", dir.display()))?
            .flatten()
            .map(|e| e.path())
            .collect();
        out.sort();
        Ok(out)
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.ensure_dir(parent)?;
        }
        std::fs::write(path, bytes).with_context(|| format!("write {}", path.display()))
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).with_context(|| format!("read {}", path.display()))
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        if let Some(parent) = to.parent() {
            self.ensure_dir(parent)?;
        }
        std::fs::copy(from, to)
            .with_context(|| format!("copy {} to {}", from.display(), to.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_size_copy() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsModelStore;
        let a = dir.path().join("nested").join("a.bin");
        store.write(&a, b"hello").unwrap();
        assert!(store.exists(&a));
        assert_eq!(store.size(&a).unwrap(), 5);
        assert_eq!(store.read(&a).unwrap(), b"hello");

        let b = dir.path().join("copy").join("b.bin");
        store.copy(&a, &b).unwrap();
        assert_eq!(store.read(&b).unwrap(), b"hello");
    }

    #[test]
    fn test_list_sorted_and_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsModelStore;
        for name in ["b", "a", "c"] {
            store.write(&dir.path().join(name), b"").unwrap();
        }
        let names: Vec<String> = store
            .list(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(store.list(&dir.path().join("missing")).unwrap().is_empty());
        assert!(store.size(&dir.path().join("missing")).is_err());
    }
}
