//! Private key loading
//!
//! Hosts commonly share a key file, so [FileKeyCache] reads each distinct path once and hands out
//! the cached contents afterwards. Two threads missing the same path at the same time may both
//! read the file, the first insert wins.
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

pub trait KeyCache: Send + Sync {
    /// Contents of the private key at `path`
    fn load(&self, path: &Path) -> Result<Arc<str>, KeyError>;
}

#[derive(thiserror::Error, Debug)]
pub enum KeyError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

static GLOBAL: Lazy<Arc<FileKeyCache>> = Lazy::new(Default::default);

#[derive(Debug, Default)]
pub struct FileKeyCache {
    entries: RwLock<HashMap<PathBuf, Arc<str>>>,
}

impl FileKeyCache {
    /// The process-wide cache
    pub fn global() -> Arc<FileKeyCache> {
        GLOBAL.clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyCache for FileKeyCache {
    fn load(&self, path: &Path) -> Result<Arc<str>, KeyError> {
        let cached = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned();
        if let Some(contents) = cached {
            tracing::trace!(path = %path.display(), "private key cache hit");
            return Ok(contents);
        }

        tracing::debug!(path = %path.display(), "reading private key");
        let contents: Arc<str> = std::fs::read_to_string(path)?.into();

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .entry(path.to_owned())
            .or_insert(contents)
            .clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reads_each_path_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id_test");
        std::fs::write(&path, "KEY ONE").unwrap();

        let cache = FileKeyCache::default();
        assert_eq!(&*cache.load(&path).unwrap(), "KEY ONE");

        // served from the cache even though the file changed
        std::fs::write(&path, "KEY TWO").unwrap();
        assert_eq!(&*cache.load(&path).unwrap(), "KEY ONE");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileKeyCache::default();

        assert!(cache.load(&dir.path().join("nope")).is_err());
        assert!(cache.is_empty());
    }
}
