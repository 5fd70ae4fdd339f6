//! Mock queue transport for testing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::queue::{DeadLetter, QueueError, QueueMessage, QueueTransport, ReceiptToken};

#[derive(Debug, Clone)]
struct StoredMessage {
    id: i64,
    body: Vec<u8>,
    enqueued_at: DateTime<Utc>,
    visible_at: DateTime<Utc>,
    dequeue_count: u32,
    receipt: Option<String>,
}

#[derive(Default)]
struct QueueState {
    messages: HashMap<String, Vec<StoredMessage>>,
    dead: Vec<DeadLetter>,
    next_id: i64,
}

/// In-memory implementation of the QueueTransport trait with real
/// visibility-lease semantics.
///
/// Provides controllable behavior for testing:
/// - Inspect per-queue contents and send history
/// - Inject transient receive failures
pub struct MockQueue {
    state: Arc<RwLock<QueueState>>,
    sends: Arc<RwLock<Vec<(String, Vec<u8>)>>>,
    fail_next_receive: Arc<RwLock<bool>>,
}

impl Default for MockQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MockQueue {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(QueueState::default())),
            sends: Arc::new(RwLock::new(Vec::new())),
            fail_next_receive: Arc::new(RwLock::new(false)),
        }
    }

    /// Every message ever sent, in order, with its queue name.
    pub async fn sent(&self) -> Vec<(String, Vec<u8>)> {
        self.sends.read().await.clone()
    }

    /// Number of messages sent to one queue.
    pub async fn sent_to(&self, queue: &str) -> usize {
        self.sends
            .read()
            .await
            .iter()
            .filter(|(q, _)| q == queue)
            .count()
    }

    /// Configure the next receive to fail with a storage error.
    pub async fn fail_next_receive(&self) {
        *self.fail_next_receive.write().await = true;
    }

    fn find<'a>(
        messages: &'a mut Vec<StoredMessage>,
        id: i64,
        receipt: &ReceiptToken,
    ) -> Result<usize, QueueError> {
        let idx = messages
            .iter()
            .position(|m| m.id == id)
            .ok_or(QueueError::NotFound(id))?;
        if messages[idx].receipt.as_deref() != Some(receipt.as_str()) {
            return Err(QueueError::ReceiptMismatch(id));
        }
        Ok(idx)
    }
}

#[async_trait]
impl QueueTransport for MockQueue {
    async fn send(&self, queue: &str, body: &[u8]) -> Result<i64, QueueError> {
        let mut state = self.state.write().await;
        state.next_id += 1;
        let id = state.next_id;
        let now = Utc::now();
        state
            .messages
            .entry(queue.to_string())
            .or_default()
            .push(StoredMessage {
                id,
                body: body.to_vec(),
                enqueued_at: now,
                visible_at: now,
                dequeue_count: 0,
                receipt: None,
            });
        self.sends
            .write()
            .await
            .push((queue.to_string(), body.to_vec()));
        Ok(id)
    }

    async fn receive(
        &self,
        queue: &str,
        max: usize,
        lease: Duration,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        if std::mem::take(&mut *self.fail_next_receive.write().await) {
            return Err(QueueError::Storage("injected receive failure".to_string()));
        }

        let mut state = self.state.write().await;
        let now = Utc::now();
        let until = now + chrono::Duration::from_std(lease).unwrap_or_default();

        let Some(messages) = state.messages.get_mut(queue) else {
            return Ok(Vec::new());
        };

        let mut leased = Vec::new();
        for message in messages.iter_mut() {
            if leased.len() >= max {
                break;
            }
            if message.visible_at > now {
                continue;
            }
            let receipt = ReceiptToken::generate();
            message.visible_at = until;
            message.dequeue_count += 1;
            message.receipt = Some(receipt.as_str().to_string());

            leased.push(QueueMessage {
                id: message.id,
                receipt,
                dequeue_count: message.dequeue_count,
                body: message.body.clone(),
                enqueued_at: message.enqueued_at,
            });
        }

        Ok(leased)
    }

    async fn delete(
        &self,
        queue: &str,
        id: i64,
        receipt: &ReceiptToken,
    ) -> Result<(), QueueError> {
        let mut state = self.state.write().await;
        let messages = state
            .messages
            .get_mut(queue)
            .ok_or(QueueError::NotFound(id))?;
        let idx = Self::find(messages, id, receipt)?;
        messages.remove(idx);
        Ok(())
    }

    async fn extend(
        &self,
        queue: &str,
        id: i64,
        receipt: &ReceiptToken,
        lease: Duration,
    ) -> Result<(), QueueError> {
        let mut state = self.state.write().await;
        let messages = state
            .messages
            .get_mut(queue)
            .ok_or(QueueError::NotFound(id))?;
        let idx = Self::find(messages, id, receipt)?;
        messages[idx].visible_at =
            Utc::now() + chrono::Duration::from_std(lease).unwrap_or_default();
        Ok(())
    }

    async fn abandon(
        &self,
        queue: &str,
        id: i64,
        receipt: &ReceiptToken,
    ) -> Result<(), QueueError> {
        let mut state = self.state.write().await;
        let messages = state
            .messages
            .get_mut(queue)
            .ok_or(QueueError::NotFound(id))?;
        let idx = Self::find(messages, id, receipt)?;
        messages[idx].visible_at = Utc::now();
        messages[idx].receipt = None;
        Ok(())
    }

    async fn dead_letter(
        &self,
        queue: &str,
        id: i64,
        receipt: &ReceiptToken,
        reason: &str,
    ) -> Result<(), QueueError> {
        let mut state = self.state.write().await;
        let messages = state
            .messages
            .get_mut(queue)
            .ok_or(QueueError::NotFound(id))?;
        let idx = Self::find(messages, id, receipt)?;
        let message = messages.remove(idx);
        state.dead.push(DeadLetter {
            id: message.id,
            queue: queue.to_string(),
            body: String::from_utf8_lossy(&message.body).into_owned(),
            enqueued_at: message.enqueued_at,
            dequeue_count: message.dequeue_count,
            reason: reason.to_string(),
            dead_lettered_at: Utc::now(),
        });
        Ok(())
    }

    async fn depth(&self, queue: &str) -> Result<u64, QueueError> {
        let state = self.state.read().await;
        Ok(state
            .messages
            .get(queue)
            .map(|m| m.len() as u64)
            .unwrap_or(0))
    }

    async fn dead_letters(
        &self,
        queue: Option<&str>,
        limit: usize,
    ) -> Result<Vec<DeadLetter>, QueueError> {
        let state = self.state.read().await;
        Ok(state
            .dead
            .iter()
            .rev()
            .filter(|d| queue.is_none_or(|q| d.queue == q))
            .take(limit)
            .cloned()
            .collect())
    }
}
