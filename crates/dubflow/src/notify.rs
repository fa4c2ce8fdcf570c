//! Completion and failure notifications.
//!
//! Notification delivery is best-effort: a failed notification never fails
//! the job, it only gets logged.

use async_trait::async_trait;
use thiserror::Error;

use crate::store::{Job, JobError};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification backend error: {0}")]
    Backend(String),
}

/// Receives job outcome events. Implementations push to webhooks, email or
/// websocket channels.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn job_completed(&self, job: &Job) -> Result<(), NotifyError>;
    async fn job_failed(&self, job: &Job, error: &JobError) -> Result<(), NotifyError>;
}

/// Notifier that only writes to the log. The default for deployments
/// without a push channel configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn job_completed(&self, job: &Job) -> Result<(), NotifyError> {
        log::info!(
            "Notify: job {} for user {} completed in {:?}s",
            job.id,
            job.user_id,
            job.duration_secs()
        );
        Ok(())
    }

    async fn job_failed(&self, job: &Job, error: &JobError) -> Result<(), NotifyError> {
        log::warn!(
            "Notify: job {} for user {} failed: [{}] {}",
            job.id,
            job.user_id,
            error.code,
            error.message
        );
        Ok(())
    }
}
