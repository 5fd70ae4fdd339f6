//! Publish stage: push rendered pages to their public location.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::artifact::ArtifactStore;
use crate::dedup::{fingerprint, DedupRecord, DedupStore};
use crate::queue::QueueTransport;
use crate::worker::{ProcessingOutcome, StageError, StageHandler, StageKind, WorkItem};

use super::traits::Publisher;
use super::{artifact_ref_from, fan_out_items, fan_out_outcome, unsupported_operation};

/// Stage handler for the publish stage.
///
/// Publishing goes through the dedup record store directly rather than
/// the ContentDeduplicator: the durable write here is the publisher's,
/// not an artifact-store put. The invariant is the same, one published
/// page per unique fingerprint.
pub struct PublishStage {
    artifacts: Arc<dyn ArtifactStore>,
    publisher: Arc<dyn Publisher>,
    records: Arc<dyn DedupStore>,
    queue: Arc<dyn QueueTransport>,
}

impl PublishStage {
    pub fn new(
        artifacts: Arc<dyn ArtifactStore>,
        publisher: Arc<dyn Publisher>,
        records: Arc<dyn DedupStore>,
        queue: Arc<dyn QueueTransport>,
    ) -> Self {
        Self {
            artifacts,
            publisher,
            records,
            queue,
        }
    }

    async fn publish_page(&self, item: &WorkItem) -> Result<ProcessingOutcome, StageError> {
        let artifact_ref = artifact_ref_from(item)?;
        let bytes = self.artifacts.get(&artifact_ref).await?;

        let fp = fingerprint(&bytes);
        // Namespace publish fingerprints away from the render stage's:
        // both hash the same page bytes.
        let record_key = format!("published:{}", fp);

        if let Some(existing) = self.records.get(&record_key)? {
            if !item.force_rebuild() {
                return Ok(ProcessingOutcome::duplicate(fp, existing.artifact_ref));
            }
        }

        let name = artifact_ref
            .rsplit('/')
            .next()
            .unwrap_or(artifact_ref.as_str());
        let location = self.publisher.publish(name, &bytes).await?;

        // Record strictly after the publish is durable.
        self.records.put(&DedupRecord {
            fingerprint: record_key,
            artifact_ref: location.clone(),
            first_seen_at: Utc::now(),
        })?;

        Ok(ProcessingOutcome::created(fp, location))
    }
}

#[async_trait]
impl StageHandler for PublishStage {
    fn kind(&self) -> StageKind {
        StageKind::Publish
    }

    async fn handle(&self, item: &WorkItem) -> Result<ProcessingOutcome, StageError> {
        match item.operation.as_str() {
            op if op == StageKind::Publish.signal_operation() => {
                let refs = self
                    .artifacts
                    .list(StageKind::Render.artifact_prefix())
                    .await?;
                let enqueued = fan_out_items(
                    &self.queue,
                    StageKind::Publish,
                    &item.batch_id,
                    refs,
                    item.force_rebuild(),
                )
                .await?;
                Ok(fan_out_outcome(enqueued))
            }
            op if op == StageKind::Publish.item_operation() => self.publish_page(item).await,
            other => Ok(unsupported_operation(StageKind::Publish, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::SqliteDedupStore;
    use crate::queue::SqliteQueue;
    use crate::testing::{MockArtifactStore, MockPublisher};
    use crate::worker::{OutcomeStatus, Trigger};
    use serde_json::json;

    struct Fixture {
        queue: Arc<SqliteQueue>,
        artifacts: Arc<MockArtifactStore>,
        publisher: Arc<MockPublisher>,
        stage: PublishStage,
    }

    fn fixture() -> Fixture {
        let queue = Arc::new(SqliteQueue::in_memory().unwrap());
        let artifacts = Arc::new(MockArtifactStore::new());
        let publisher = Arc::new(MockPublisher::new());
        let stage = PublishStage::new(
            Arc::clone(&artifacts) as Arc<dyn ArtifactStore>,
            Arc::clone(&publisher) as Arc<dyn Publisher>,
            Arc::new(SqliteDedupStore::in_memory().unwrap()),
            Arc::clone(&queue) as Arc<dyn QueueTransport>,
        );
        Fixture {
            queue,
            artifacts,
            publisher,
            stage,
        }
    }

    #[tokio::test]
    async fn test_signal_fans_out_per_page() {
        let f = fixture();
        f.artifacts.put("pages/a.html", b"<html>a</html>").await.unwrap();
        f.artifacts.put("pages/b.html", b"<html>b</html>").await.unwrap();

        let signal = WorkItem::new("publish_requested", Trigger::QueueEmpty);
        let outcome = f.stage.handle(&signal).await.unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Skipped);
        assert_eq!(f.queue.depth("publish").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_publish_page_publishes_once() {
        let f = fixture();
        f.artifacts.put("pages/a.html", b"<html>a</html>").await.unwrap();

        let item = WorkItem::new("publish_page", Trigger::QueueEmpty)
            .with_payload(json!({"artifact_ref": "pages/a.html"}));

        let first = f.stage.handle(&item).await.unwrap();
        let second = f.stage.handle(&item).await.unwrap();

        assert_eq!(first.status, OutcomeStatus::Created);
        assert_eq!(second.status, OutcomeStatus::Duplicate);
        assert_eq!(f.publisher.publish_count().await, 1);
    }

    #[tokio::test]
    async fn test_force_rebuild_republishes() {
        let f = fixture();
        f.artifacts.put("pages/a.html", b"<html>a</html>").await.unwrap();

        let item = WorkItem::new("publish_page", Trigger::Manual)
            .with_payload(json!({"artifact_ref": "pages/a.html", "force_rebuild": true}));

        f.stage.handle(&item).await.unwrap();
        let again = f.stage.handle(&item).await.unwrap();

        assert_eq!(again.status, OutcomeStatus::Created);
        assert_eq!(f.publisher.publish_count().await, 2);
    }

    #[tokio::test]
    async fn test_publisher_failure_propagates() {
        let f = fixture();
        f.artifacts.put("pages/a.html", b"<html>a</html>").await.unwrap();
        f.publisher
            .set_next_error(StageError::Publish("disk full".to_string()))
            .await;

        let item = WorkItem::new("publish_page", Trigger::QueueEmpty)
            .with_payload(json!({"artifact_ref": "pages/a.html"}));
        let result = f.stage.handle(&item).await;

        assert!(matches!(result, Err(StageError::Publish(_))));
        // Nothing recorded, the retry will publish
        let retry = f.stage.handle(&item).await.unwrap();
        assert_eq!(retry.status, OutcomeStatus::Created);
    }
}
