//! Types for the durable work queue transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Message does not exist (already deleted or dead-lettered).
    #[error("message not found: {0}")]
    NotFound(i64),

    /// The receipt token does not match the current delivery. The lease
    /// expired and another consumer re-leased the message.
    #[error("receipt token mismatch for message {0}")]
    ReceiptMismatch(i64),

    /// Backing storage failed.
    #[error("queue storage error: {0}")]
    Storage(String),
}

/// Opaque credential tied to one delivery of one message.
///
/// Delete, extend and abandon all require the receipt issued at lease
/// time, so a consumer whose lease expired cannot affect a later
/// delivery of the same message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptToken(pub String);

impl ReceiptToken {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A leased message as handed out by the queue transport.
///
/// The transport owns the message; the holder must delete it on
/// success, extend it while still working, or abandon it on failure.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    /// Transport-assigned message id.
    pub id: i64,
    /// Credential for this specific delivery.
    pub receipt: ReceiptToken,
    /// Number of times this message has been delivered, this lease included.
    pub dequeue_count: u32,
    /// Raw payload bytes.
    pub body: Vec<u8>,
    /// When the message was first enqueued.
    pub enqueued_at: DateTime<Utc>,
}

/// A message that exceeded its retry budget, preserved for inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: i64,
    pub queue: String,
    /// Payload decoded as UTF-8 lossily for inspection.
    pub body: String,
    pub enqueued_at: DateTime<Utc>,
    pub dequeue_count: u32,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}
