//! Startup crash recovery.
//!
//! A worker that dies mid-job leaves the job in `processing` with some step
//! stuck in `processing`, and possibly a pending job whose message was
//! consumed but never acknowledged. On startup the recovery pass resets
//! in-flight steps and re-enqueues every non-terminal job. Duplicate
//! messages are harmless: execution skips completed steps and terminal jobs
//! absorb redeliveries entirely.

use thiserror::Error;

use crate::queue::dispatcher::{DispatchError, Dispatcher};
use crate::store::{JobStatus, JobStore, StoreError};

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RecoveryReport {
    /// Pending jobs re-enqueued.
    pub requeued_pending: u32,
    /// Processing jobs whose in-flight steps were reset and re-enqueued.
    pub recovered_processing: u32,
}

pub struct RecoveryManager {
    store: JobStore,
    dispatcher: Dispatcher,
}

impl RecoveryManager {
    pub fn new(store: JobStore, dispatcher: Dispatcher) -> Self {
        Self { store, dispatcher }
    }

    /// Re-enqueues all non-terminal jobs, resetting in-flight step state
    /// for jobs that were mid-execution.
    pub async fn recover_all(&self) -> Result<RecoveryReport, RecoveryError> {
        let mut report = RecoveryReport::default();

        for job in self.store.list_by_status(JobStatus::Processing)? {
            let reset = self.store.reset_inflight_steps(&job.id)?;
            log::info!(
                "Recovering interrupted job {} ({} in-flight steps reset)",
                job.id,
                reset
            );
            self.dispatcher.redispatch(&job).await?;
            report.recovered_processing += 1;
        }

        for job in self.store.list_by_status(JobStatus::Pending)? {
            log::info!("Re-enqueueing pending job {}", job.id);
            self.dispatcher.redispatch(&job).await?;
            report.requeued_pending += 1;
        }

        if report.requeued_pending > 0 || report.recovered_processing > 0 {
            log::info!(
                "Recovery complete: {} pending re-enqueued, {} interrupted recovered",
                report.requeued_pending,
                report.recovered_processing
            );
        }
        Ok(report)
    }
}
