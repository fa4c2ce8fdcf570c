//! Crate-level error type aggregating the per-module errors.

use thiserror::Error;

use crate::config::ConfigError;
use crate::db::DatabaseError;
use crate::pipeline::PipelineError;
use crate::queue::dispatcher::DispatchError;
use crate::queue::QueueError;
use crate::recovery::RecoveryError;
use crate::storage::StorageError;
use crate::store::StoreError;
use crate::workspace::WorkspaceError;

#[derive(Debug, Error)]
pub enum DubflowError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Recovery(#[from] RecoveryError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

pub type Result<T> = std::result::Result<T, DubflowError>;
