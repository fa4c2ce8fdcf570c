//! Job queue: message format, transport trait, dispatcher and consumers.
//!
//! Delivery semantics are at-least-once. Received messages stay invisible
//! for a visibility timeout and reappear unless deleted, so consumers must
//! tolerate redeliveries; the orchestrator's terminal-status guard makes
//! duplicate executions harmless.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod consumer;
pub mod dispatcher;
pub mod memory;
pub mod message;

pub use consumer::{Consumer, ConsumerPool};
pub use dispatcher::Dispatcher;
pub use memory::InMemoryQueue;
pub use message::{QueueMessage, MESSAGE_TYPE_DUBBING};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Queue backend error: {0}")]
    Backend(String),
}

/// One received message plus the receipt needed to acknowledge it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: QueueMessage,
    /// Opaque acknowledgement handle, valid until the visibility timeout
    /// expires.
    pub receipt: String,
    /// How many times this message has been delivered, starting at 1.
    pub delivery_count: u32,
}

/// Message transport with visibility-timeout semantics.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn send(&self, message: &QueueMessage) -> Result<(), QueueError>;

    /// Waits up to `wait` for a visible message. A received message becomes
    /// invisible to other consumers until deleted or its visibility timeout
    /// expires.
    async fn receive(&self, wait: Duration) -> Result<Option<Delivery>, QueueError>;

    /// Acknowledges a delivery. A stale receipt (visibility already
    /// expired, or the message already deleted) is a no-op.
    async fn delete(&self, receipt: &str) -> Result<(), QueueError>;
}
