//! In-process queue with visibility-timeout semantics.
//!
//! Backs tests and single-node deployments. Messages received but not
//! deleted become visible again after the visibility timeout, which gives
//! the same at-least-once behavior as the hosted queue services this stands
//! in for.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Notify;
use uuid::Uuid;

use super::{Delivery, JobQueue, QueueError, QueueMessage};

struct Entry {
    message: QueueMessage,
    receipt: Option<String>,
    invisible_until: Option<Instant>,
    delivery_count: u32,
}

impl Entry {
    fn is_visible(&self, now: Instant) -> bool {
        match self.invisible_until {
            None => true,
            Some(deadline) => now >= deadline,
        }
    }
}

pub struct InMemoryQueue {
    entries: Mutex<VecDeque<Entry>>,
    notify: Notify,
    visibility_timeout: Duration,
}

impl InMemoryQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            visibility_timeout,
        }
    }

    fn try_receive(&self) -> Option<Delivery> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let entry = entries.iter_mut().find(|e| e.is_visible(now))?;

        let receipt = Uuid::new_v4().to_string();
        entry.receipt = Some(receipt.clone());
        entry.invisible_until = Some(now + self.visibility_timeout);
        entry.delivery_count += 1;

        Some(Delivery {
            message: entry.message.clone(),
            receipt,
            delivery_count: entry.delivery_count,
        })
    }

    /// Number of messages currently in the queue, visible or not.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobQueue for InMemoryQueue {
    async fn send(&self, message: &QueueMessage) -> Result<(), QueueError> {
        {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.push_back(Entry {
                message: message.clone(),
                receipt: None,
                invisible_until: None,
                delivery_count: 0,
            });
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn receive(&self, wait: Duration) -> Result<Option<Delivery>, QueueError> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(delivery) = self.try_receive() {
                return Ok(Some(delivery));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            // Wake on send, or poll so visibility expiries are noticed.
            let tick = Duration::from_millis(25).min(deadline - now);
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(tick) => {}
            }
        }
    }

    async fn delete(&self, receipt: &str) -> Result<(), QueueError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(index) = entries
            .iter()
            .position(|e| e.receipt.as_deref() == Some(receipt))
        {
            entries.remove(index);
        }
        Ok(())
    }
}
