//! Job submission: create the record, then enqueue the work.

use std::sync::Arc;

use thiserror::Error;

use super::{JobQueue, QueueError, QueueMessage};
use crate::store::{Job, JobStore, NewJob, StoreError};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Creates jobs and puts their execution requests on the queue.
#[derive(Clone)]
pub struct Dispatcher {
    store: JobStore,
    queue: Arc<dyn JobQueue>,
}

impl Dispatcher {
    pub fn new(store: JobStore, queue: Arc<dyn JobQueue>) -> Self {
        Self { store, queue }
    }

    /// Creates a pending job and enqueues it.
    ///
    /// The job row is committed before the send, so a send failure leaves a
    /// pending job behind rather than losing the request; recovery
    /// re-dispatches pending jobs that have no message in flight.
    pub async fn submit(&self, new: NewJob) -> Result<Job, DispatchError> {
        let job = self.store.create_job(new)?;
        self.queue.send(&QueueMessage::dubbing(&job)).await?;
        log::info!("Dispatched job {} to the queue", job.id);
        Ok(job)
    }

    /// Re-enqueues an existing job, used by crash recovery.
    pub async fn redispatch(&self, job: &Job) -> Result<(), DispatchError> {
        self.queue.send(&QueueMessage::dubbing(job)).await?;
        log::info!("Re-dispatched job {} to the queue", job.id);
        Ok(())
    }
}
