//! Filesystem-backed object storage.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{ObjectStorage, StorageError};

/// Object storage rooted at a local directory. Keys map directly to
/// relative paths under the root.
pub struct LocalObjectStorage {
    root: PathBuf,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        // Keys are relative references; reject traversal out of the root.
        let relative = Path::new(key);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(StorageError::Backend(format!("invalid key: {}", key)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn download(&self, key: &str, dest: &Path) -> Result<(), StorageError> {
        let src = self.resolve(key)?;
        if !src.exists() {
            return Err(StorageError::NotFound(key.to_string()));
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        tokio::fs::copy(&src, dest)
            .await
            .map_err(|e| StorageError::Io {
                path: src,
                source: e,
            })?;
        Ok(())
    }

    async fn upload(&self, src: &Path, key: &str) -> Result<(), StorageError> {
        let dest = self.resolve(key)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        tokio::fs::copy(src, &dest)
            .await
            .map_err(|e| StorageError::Io {
                path: src.to_path_buf(),
                source: e,
            })?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.resolve(key)?.exists())
    }
}
