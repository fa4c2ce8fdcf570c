use thiserror::Error;

use crate::store::{JobStatus, StoreError};
use crate::workspace::WorkspaceError;

/// Errors from pipeline execution.
///
/// `StepFailed` and `NotResumable` are permanent: the job state already
/// reflects the outcome and the triggering message can be acknowledged.
/// Everything else is transient infrastructure trouble; the job is left
/// untouched so a redelivery can pick it up again.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("Step {step} failed: [{code}] {message}")]
    StepFailed {
        step: String,
        code: String,
        message: String,
    },

    #[error("No handler registered for step: {0}")]
    UnknownStep(String),

    #[error("Job {job_id} cannot be resumed from status {status}")]
    NotResumable { job_id: String, status: JobStatus },
}

impl PipelineError {
    /// True when retrying later could succeed and the job was left
    /// unmodified.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            PipelineError::StepFailed { .. }
                | PipelineError::NotResumable { .. }
                | PipelineError::UnknownStep(_)
        )
    }
}
