//! Mock stage handler for testing the drain loop.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::worker::{
    OutcomeStatus, ProcessingOutcome, StageError, StageHandler, StageKind, WorkItem,
};

/// A handled item recorded for assertions.
#[derive(Debug, Clone)]
pub struct HandledItem {
    pub operation: String,
    pub batch_id: String,
}

/// Mock implementation of the StageHandler trait.
///
/// Provides controllable behavior for testing:
/// - Script per-call outcomes (created, duplicate, error...)
/// - Record every handled item for assertions
/// - Simulate slow handlers with an injected delay
pub struct MockHandler {
    kind: StageKind,
    handled: Arc<RwLock<Vec<HandledItem>>>,
    /// Outcomes consumed front-to-back; when empty, `default_created`
    /// decides between Created and Duplicate.
    script: Arc<RwLock<VecDeque<Result<ProcessingOutcome, StageError>>>>,
    default_created: Arc<RwLock<bool>>,
    delay: Arc<RwLock<Option<Duration>>>,
}

impl MockHandler {
    pub fn new(kind: StageKind) -> Self {
        Self {
            kind,
            handled: Arc::new(RwLock::new(Vec::new())),
            script: Arc::new(RwLock::new(VecDeque::new())),
            default_created: Arc::new(RwLock::new(false)),
            delay: Arc::new(RwLock::new(None)),
        }
    }

    /// Every unscripted call returns a Created outcome.
    pub async fn set_created_outcomes(&self) {
        *self.default_created.write().await = true;
    }

    /// Every unscripted call returns a Duplicate outcome.
    pub async fn set_duplicate_outcomes(&self) {
        *self.default_created.write().await = false;
    }

    /// Queue an explicit outcome for the next call.
    pub async fn push_outcome(&self, outcome: ProcessingOutcome) {
        self.script.write().await.push_back(Ok(outcome));
    }

    /// Queue an error for the next call.
    pub async fn push_error(&self, error: StageError) {
        self.script.write().await.push_back(Err(error));
    }

    /// Delay every call by `delay` (for timeout tests).
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    /// Items handled so far.
    pub async fn handled(&self) -> Vec<HandledItem> {
        self.handled.read().await.clone()
    }

    pub async fn handled_count(&self) -> usize {
        self.handled.read().await.len()
    }
}

#[async_trait]
impl StageHandler for MockHandler {
    fn kind(&self) -> StageKind {
        self.kind
    }

    async fn handle(&self, item: &WorkItem) -> Result<ProcessingOutcome, StageError> {
        if let Some(delay) = *self.delay.read().await {
            tokio::time::sleep(delay).await;
        }

        self.handled.write().await.push(HandledItem {
            operation: item.operation.clone(),
            batch_id: item.batch_id.clone(),
        });

        if let Some(scripted) = self.script.write().await.pop_front() {
            return scripted;
        }

        if *self.default_created.read().await {
            let fp = format!("fp-{}", self.handled.read().await.len());
            Ok(ProcessingOutcome::created(
                fp.clone(),
                format!("{}/{}.json", self.kind.artifact_prefix(), fp),
            ))
        } else {
            Ok(ProcessingOutcome::duplicate("fp-dup", "existing/ref.json"))
        }
    }
}
