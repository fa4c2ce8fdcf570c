//! Object storage abstraction for source media and published artifacts.
//!
//! The pipeline only ever downloads a source object and uploads produced
//! artifacts, so the trait surface stays small. `LocalObjectStorage` backs
//! tests and single-node deployments with a plain directory tree.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

pub mod local;

pub use local::LocalObjectStorage;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Async object store keyed by string references like
/// `uploads/user-1/source.mp4`.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Downloads the object at `key` to the local `dest` path.
    async fn download(&self, key: &str, dest: &Path) -> Result<(), StorageError>;

    /// Uploads the local file at `src` under `key`, overwriting any
    /// existing object.
    async fn upload(&self, src: &Path, key: &str) -> Result<(), StorageError>;

    async fn exists(&self, key: &str) -> Result<bool, StorageError>;
}
