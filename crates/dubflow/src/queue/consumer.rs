//! Queue consumers: poll, execute, acknowledge.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::{JobQueue, QueueError};
use crate::pipeline::Orchestrator;

/// Pulls messages off the queue and runs them through the orchestrator.
///
/// Acknowledgement policy: a message is deleted when execution succeeded,
/// when the failure is permanent (the job state already records it), or
/// when the message itself is malformed. Only transient infrastructure
/// errors leave the message in place for redelivery after the visibility
/// timeout.
#[derive(Clone)]
pub struct Consumer {
    queue: Arc<dyn JobQueue>,
    orchestrator: Arc<Orchestrator>,
    poll_wait: Duration,
}

impl Consumer {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        orchestrator: Arc<Orchestrator>,
        poll_wait: Duration,
    ) -> Self {
        Self {
            queue,
            orchestrator,
            poll_wait,
        }
    }

    /// Polls once and processes at most one message. Returns whether a
    /// message was received.
    pub async fn run_once(&self) -> Result<bool, QueueError> {
        let delivery = match self.queue.receive(self.poll_wait).await? {
            Some(delivery) => delivery,
            None => return Ok(false),
        };

        if !delivery.message.is_dubbing() {
            log::warn!(
                "Discarding message with unsupported type '{}'",
                delivery.message.message_type
            );
            self.queue.delete(&delivery.receipt).await?;
            return Ok(true);
        }

        let job_id = delivery.message.job_id.clone();
        if delivery.delivery_count > 1 {
            log::info!(
                "Redelivery #{} for job {}",
                delivery.delivery_count,
                job_id
            );
        }

        // Re-read the job before doing any work: redeliveries for jobs that
        // already reached a terminal state, and messages whose job no longer
        // exists, are acknowledged and discarded without invoking execution.
        match self.orchestrator.store().find_job(&job_id) {
            Ok(Some(job)) if job.status.is_terminal() => {
                log::info!("Job {} already {}, discarding message", job_id, job.status);
                self.queue.delete(&delivery.receipt).await?;
                return Ok(true);
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                log::warn!("Discarding message for unknown job {}", job_id);
                self.queue.delete(&delivery.receipt).await?;
                return Ok(true);
            }
            Err(e) => {
                // Leave the message; the store may recover by redelivery.
                log::warn!("Failed to load job {} from the store: {}", job_id, e);
                return Ok(true);
            }
        }

        match self.orchestrator.execute(&job_id).await {
            Ok(()) => {
                self.queue.delete(&delivery.receipt).await?;
            }
            Err(e) if e.is_transient() => {
                // Leave the message; it reappears after the visibility
                // timeout and the job continues from its recorded state.
                log::warn!("Transient error on job {}, will retry: {}", job_id, e);
            }
            Err(e) => {
                log::error!("Job {} failed permanently: {}", job_id, e);
                self.queue.delete(&delivery.receipt).await?;
            }
        }
        Ok(true)
    }

    async fn run_loop(self, shutdown: Arc<AtomicBool>) {
        log::info!("Consumer started");
        while !shutdown.load(Ordering::Relaxed) {
            if let Err(e) = self.run_once().await {
                log::error!("Queue error in consumer loop: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
        log::info!("Consumer stopped");
    }
}

/// A fixed-size pool of consumer tasks sharing one queue.
pub struct ConsumerPool {
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl ConsumerPool {
    /// Spawns `size` consumer tasks.
    pub fn start(consumer: Consumer, size: usize) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let handles = (0..size)
            .map(|_| {
                let consumer = consumer.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(consumer.run_loop(shutdown))
            })
            .collect();
        log::info!("Started consumer pool with {} workers", size);
        Self { shutdown, handles }
    }

    /// Signals shutdown and waits for all consumers to finish their
    /// current message.
    pub async fn shutdown(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for handle in self.handles {
            if let Err(e) = handle.await {
                log::error!("Consumer task panicked: {}", e);
            }
        }
        log::info!("Consumer pool shut down");
    }
}
