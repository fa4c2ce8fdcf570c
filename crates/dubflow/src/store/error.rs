use thiserror::Error;

use super::types::JobStatus;
use crate::db::DatabaseError;

/// Errors from the job and step state store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Step not found: {job_id}/{step_name}")]
    StepNotFound { job_id: String, step_name: String },

    #[error("Invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Job {job_id} exhausted its retries ({retry_count}/{max_retries})")]
    RetryExhausted {
        job_id: String,
        retry_count: u32,
        max_retries: u32,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
