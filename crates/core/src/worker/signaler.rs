//! Downstream completion signaling.

use std::sync::Arc;

use tracing::{debug, info};

use crate::audit::{AuditEvent, AuditHandle};
use crate::metrics;
use crate::queue::QueueTransport;

use super::types::{BatchState, ContentSummary, StageKind, Trigger, WorkItem, WorkerError};

/// Posts exactly one "work available" message to the next stage's queue,
/// and only when the finished drain cycle actually produced artifacts.
pub struct StageCompletionSignaler {
    queue: Arc<dyn QueueTransport>,
    audit: Option<AuditHandle>,
}

impl StageCompletionSignaler {
    pub fn new(queue: Arc<dyn QueueTransport>) -> Self {
        Self { queue, audit: None }
    }

    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Signal the downstream stage iff `batch.artifacts_created > 0`.
    ///
    /// The outgoing summary carries the count of artifacts created, not
    /// messages processed; the two differ whenever duplicates were
    /// skipped, and the receiver validates the count again before
    /// acting.
    ///
    /// Returns the posted message id, or None when nothing was sent
    /// (last stage, or zero artifacts).
    pub async fn signal_if_work_done(
        &self,
        from: StageKind,
        batch: &BatchState,
    ) -> Result<Option<i64>, WorkerError> {
        let Some(next) = from.next() else {
            return Ok(None);
        };

        if batch.artifacts_created == 0 {
            debug!(
                stage = from.as_str(),
                "no new artifacts this cycle, downstream signal withheld"
            );
            metrics::SIGNALS_SUPPRESSED
                .with_label_values(&[from.as_str()])
                .inc();
            return Ok(None);
        }

        let item = WorkItem::new(next.signal_operation(), Trigger::QueueEmpty)
            .with_content_summary(ContentSummary {
                artifacts_created: batch.artifacts_created,
                artifacts_failed: batch.artifacts_failed,
                force_rebuild: batch.force_rebuild_requested,
            });

        let body = item.to_bytes()?;
        let message_id = self.queue.send(next.queue_name(), &body).await?;

        metrics::MESSAGES_SENT
            .with_label_values(&[next.queue_name()])
            .inc();
        metrics::SIGNALS_SENT
            .with_label_values(&[from.as_str(), next.as_str()])
            .inc();

        if let Some(ref audit) = self.audit {
            audit
                .emit(AuditEvent::StageSignaled {
                    from_stage: from.as_str().to_string(),
                    to_stage: next.as_str().to_string(),
                    artifacts_created: batch.artifacts_created,
                    artifacts_failed: batch.artifacts_failed,
                    message_id,
                })
                .await;
        }

        info!(
            from_stage = from.as_str(),
            to_stage = next.as_str(),
            artifacts_created = batch.artifacts_created,
            message_id,
            "signaled downstream stage"
        );

        Ok(Some(message_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::SqliteQueue;
    use std::time::Duration;

    fn batch_with(created: u64, failed: u64) -> BatchState {
        let mut batch = BatchState::new();
        batch.artifacts_created = created;
        batch.artifacts_failed = failed;
        batch
    }

    #[tokio::test]
    async fn test_no_signal_when_zero_artifacts() {
        let queue = Arc::new(SqliteQueue::in_memory().unwrap());
        let signaler = StageCompletionSignaler::new(Arc::clone(&queue) as Arc<dyn QueueTransport>);

        let result = signaler
            .signal_if_work_done(StageKind::Collect, &batch_with(0, 3))
            .await
            .unwrap();

        assert!(result.is_none());
        assert_eq!(queue.depth("process").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_signal_posted_with_artifact_count() {
        let queue = Arc::new(SqliteQueue::in_memory().unwrap());
        let signaler = StageCompletionSignaler::new(Arc::clone(&queue) as Arc<dyn QueueTransport>);

        let result = signaler
            .signal_if_work_done(StageKind::Collect, &batch_with(7, 1))
            .await
            .unwrap();

        assert!(result.is_some());
        assert_eq!(queue.depth("process").await.unwrap(), 1);

        let messages = queue
            .receive("process", 10, Duration::from_secs(30))
            .await
            .unwrap();
        let item = WorkItem::from_bytes(&messages[0].body).unwrap();
        assert_eq!(item.operation, "process_requested");
        assert_eq!(item.trigger, Trigger::QueueEmpty);
        let summary = item.content_summary.unwrap();
        assert_eq!(summary.artifacts_created, 7);
        assert_eq!(summary.artifacts_failed, 1);
    }

    #[tokio::test]
    async fn test_exactly_one_signal_per_cycle() {
        let queue = Arc::new(SqliteQueue::in_memory().unwrap());
        let signaler = StageCompletionSignaler::new(Arc::clone(&queue) as Arc<dyn QueueTransport>);

        signaler
            .signal_if_work_done(StageKind::Render, &batch_with(2, 0))
            .await
            .unwrap();

        assert_eq!(queue.depth("publish").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_last_stage_signals_nothing() {
        let queue = Arc::new(SqliteQueue::in_memory().unwrap());
        let signaler = StageCompletionSignaler::new(Arc::clone(&queue) as Arc<dyn QueueTransport>);

        let result = signaler
            .signal_if_work_done(StageKind::Publish, &batch_with(5, 0))
            .await
            .unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_force_rebuild_propagates() {
        let queue = Arc::new(SqliteQueue::in_memory().unwrap());
        let signaler = StageCompletionSignaler::new(Arc::clone(&queue) as Arc<dyn QueueTransport>);

        let mut batch = batch_with(1, 0);
        batch.force_rebuild_requested = true;

        signaler
            .signal_if_work_done(StageKind::Process, &batch)
            .await
            .unwrap();

        let messages = queue
            .receive("render", 10, Duration::from_secs(30))
            .await
            .unwrap();
        let item = WorkItem::from_bytes(&messages[0].body).unwrap();
        assert!(item.content_summary.unwrap().force_rebuild);
    }
}
