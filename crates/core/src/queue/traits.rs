use std::time::Duration;

use async_trait::async_trait;

use super::types::{DeadLetter, QueueError, QueueMessage, ReceiptToken};

/// Durable work queue with at-least-once delivery and per-message
/// visibility leases.
///
/// Semantics expected of any implementation:
/// - `receive` hides returned messages from other consumers for the
///   requested lease duration and increments their dequeue count.
/// - A message whose lease lapses without `delete` becomes visible again.
/// - `delete`/`extend`/`abandon` only succeed with the receipt issued by
///   the delivering `receive` call.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Append a message, returning its transport-assigned id.
    async fn send(&self, queue: &str, body: &[u8]) -> Result<i64, QueueError>;

    /// Lease up to `max` visible messages for `lease`.
    ///
    /// Returns an empty vec when no message is currently visible; that is
    /// not an error.
    async fn receive(
        &self,
        queue: &str,
        max: usize,
        lease: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError>;

    /// Acknowledge successful processing; the message is gone for good.
    async fn delete(&self, queue: &str, id: i64, receipt: &ReceiptToken)
        -> Result<(), QueueError>;

    /// Push the visibility horizon out while still working on a message.
    async fn extend(
        &self,
        queue: &str,
        id: i64,
        receipt: &ReceiptToken,
        lease: Duration,
    ) -> Result<(), QueueError>;

    /// Give up on this delivery: make the message immediately visible to
    /// other consumers instead of waiting for the lease to lapse.
    async fn abandon(&self, queue: &str, id: i64, receipt: &ReceiptToken)
        -> Result<(), QueueError>;

    /// Remove the message from the main queue and preserve it on the
    /// dead-letter side path.
    async fn dead_letter(
        &self,
        queue: &str,
        id: i64,
        receipt: &ReceiptToken,
        reason: &str,
    ) -> Result<(), QueueError>;

    /// Number of messages in the queue, leased ones included.
    async fn depth(&self, queue: &str) -> Result<u64, QueueError>;

    /// Inspect dead-lettered messages, newest first.
    async fn dead_letters(
        &self,
        queue: Option<&str>,
        limit: usize,
    ) -> Result<Vec<DeadLetter>, QueueError>;
}
