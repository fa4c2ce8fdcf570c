//! Service configuration.
//!
//! Loaded from a JSON file; every field has a default so a missing file
//! yields a usable single-node setup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Seconds a received message stays invisible before redelivery.
    pub visibility_timeout_secs: u64,
    /// Long-poll wait per receive call, in seconds.
    pub poll_wait_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            visibility_timeout_secs: 300,
            poll_wait_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub database_path: PathBuf,
    pub workspace_root: PathBuf,
    pub storage_root: PathBuf,
    /// Number of concurrent consumer tasks.
    pub worker_count: usize,
    /// Default retry budget for new jobs.
    pub max_retries: u32,
    /// Days to keep terminal jobs before cleanup.
    pub retention_days: i64,
    pub queue: QueueConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/dubflow.db"),
            workspace_root: PathBuf::from("data/workspaces"),
            storage_root: PathBuf::from("data/storage"),
            worker_count: 2,
            max_retries: 3,
            retention_days: 30,
            queue: QueueConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Loads config from a JSON file. A missing file yields the defaults;
    /// a present but malformed file is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!(
                    "No config at {}, using defaults",
                    path.display()
                );
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = ServiceConfig::load(Path::new("/nonexistent/dubflow.json")).unwrap();
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.queue.visibility_timeout_secs, 300);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"worker_count": 8, "queue": {"poll_wait_secs": 2}}"#).unwrap();

        let config = ServiceConfig::load(&path).unwrap();
        assert_eq!(config.worker_count, 8);
        assert_eq!(config.queue.poll_wait_secs, 2);
        assert_eq!(config.queue.visibility_timeout_secs, 300);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            ServiceConfig::load(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
