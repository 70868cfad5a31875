//! Photographs as files under a local directory

use async_trait::async_trait;
use bytes::Bytes;
use lombada_common::{Error, Result};
use std::path::{Component, Path, PathBuf};

use super::{public_url, ImageStore};

#[derive(Debug, Clone)]
pub struct LocalImageStore {
    root: PathBuf,
    url_prefix: String,
}

impl LocalImageStore {
    /// Create the store, making `root` if it does not exist
    pub async fn new(root: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Result<Self> {
        let root = root.into();
        if !root.exists() {
            tokio::fs::create_dir_all(&root).await?;
        }
        tracing::debug!(root = %root.display(), "Local image store ready");

        Ok(Self {
            root,
            url_prefix: url_prefix.into(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `key` below the root; keys may only name plain path segments
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let plain = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));

        if !plain {
            return Err(Error::InvalidInput(format!("invalid image key '{}'", key)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<String> {
        let path = self.resolve(key)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &data).await?;

        tracing::debug!(key, size = data.len(), "Wrote image file");
        Ok(public_url(&self.url_prefix, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_writes_file_and_returns_url() {
        let dir = TempDir::new().unwrap();
        let store = LocalImageStore::new(dir.path().join("uploads"), "/uploads")
            .await
            .unwrap();

        let url = store
            .put("20240315/20240315143022_a.jpg", Bytes::from_static(b"jpeg"))
            .await
            .unwrap();

        assert_eq!(url, "/uploads/20240315/20240315143022_a.jpg");
        let written = std::fs::read(store.root().join("20240315/20240315143022_a.jpg")).unwrap();
        assert_eq!(written, b"jpeg");
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = TempDir::new().unwrap();
        let store = LocalImageStore::new(dir.path(), "/uploads").await.unwrap();

        for key in ["../x.jpg", "/etc/x.jpg", "a/../../x.jpg", ""] {
            let result = store.put(key, Bytes::from_static(b"x")).await;
            assert!(matches!(result, Err(Error::InvalidInput(_))), "key {key:?}");
        }
    }
}
