//! Filesystem-backed object store

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::storage::ObjectStore;

/// Object store rooted at a local directory. Keys map to relative paths
/// under the root.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| Error::Storage(format!("cannot create {}: {e}", root.display())))?;
        Ok(Self { root })
    }

    /// Resolve a key to a path under the root, rejecting empty keys,
    /// absolute keys, and traversal segments.
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.starts_with('/') {
            return Err(Error::Storage(format!("invalid object key '{key}'")));
        }
        let mut path = self.root.clone();
        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(Error::Storage(format!("invalid object key '{key}'")));
            }
            path.push(segment);
        }
        Ok(path)
    }

    fn collect_keys(dir: &Path, root: &Path, out: &mut Vec<String>) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                Self::collect_keys(&path, root, out)?;
            } else if let Ok(rel) = path.strip_prefix(root) {
                let key = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                out.push(key);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Storage(format!("cannot create {}: {e}", parent.display())))?;
        }
        // write to a temp sibling then rename so readers never see a
        // partially written object
        let tmp = path.with_extension("tmp-write");
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| Error::Storage(format!("cannot write '{key}': {e}")))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::Storage(format!("cannot finalize '{key}': {e}")))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("object '{key}'")))
            }
            Err(e) => Err(Error::Storage(format!("cannot read '{key}': {e}"))),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.resolve(key)?;
        Ok(tokio::fs::try_exists(&path)
            .await
            .map_err(|e| Error::Storage(format!("cannot stat '{key}': {e}")))?)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let root = self.root.clone();
        let mut keys = Vec::new();
        if root.exists() {
            Self::collect_keys(&root, &root, &mut keys)
                .map_err(|e| Error::Storage(format!("cannot list objects: {e}")))?;
        }
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }

    fn name(&self) -> &str {
        "local"
    }
}
