//! Collect stage: pull external sources into collected bundles.

use std::sync::Arc;

use async_trait::async_trait;

use crate::dedup::{fingerprint, ContentDeduplicator};
use crate::queue::QueueTransport;
use crate::worker::{ProcessingOutcome, StageError, StageHandler, StageKind, Trigger, WorkItem};

use super::traits::{ContentSource, SourceBundle};
use super::{fan_out_outcome, unsupported_operation};

/// Stage handler for the collect stage.
///
/// A `collect_requested` signal fans out one `collect_source` message
/// per configured source. Each `collect_source` message fetches one
/// source and writes the resulting bundle through the deduplicator: an
/// unchanged source produces an identical normalized bundle, so nothing
/// new is written and no downstream signal results.
pub struct CollectStage {
    sources: Vec<String>,
    client: Arc<dyn ContentSource>,
    dedup: Arc<ContentDeduplicator>,
    queue: Arc<dyn QueueTransport>,
}

impl CollectStage {
    pub fn new(
        sources: Vec<String>,
        client: Arc<dyn ContentSource>,
        dedup: Arc<ContentDeduplicator>,
        queue: Arc<dyn QueueTransport>,
    ) -> Self {
        Self {
            sources,
            client,
            dedup,
            queue,
        }
    }

    async fn fan_out_sources(&self, item: &WorkItem) -> Result<ProcessingOutcome, StageError> {
        let force = item.force_rebuild();
        let mut enqueued = 0;
        for source in &self.sources {
            let mut payload = serde_json::json!({ "source": source });
            if force {
                payload["force_rebuild"] = serde_json::json!(true);
            }
            let work = WorkItem::new(StageKind::Collect.item_operation(), Trigger::QueueEmpty)
                .with_batch_id(&item.batch_id)
                .with_payload(payload);
            self.queue
                .send(StageKind::Collect.queue_name(), &work.to_bytes()?)
                .await?;
            enqueued += 1;
        }
        Ok(fan_out_outcome(enqueued))
    }

    async fn collect_source(&self, item: &WorkItem) -> Result<ProcessingOutcome, StageError> {
        let source = item
            .payload
            .get("source")
            .and_then(|v| v.as_str())
            .ok_or_else(|| StageError::InvalidPayload("missing source".to_string()))?;

        let documents = self.client.fetch(source).await?;
        if documents.is_empty() {
            return Ok(ProcessingOutcome::skipped(format!(
                "source {} yielded no documents",
                source
            )));
        }

        let bundle = SourceBundle::new(source, documents);
        let bytes = serde_json::to_vec_pretty(&bundle)?;

        // Content-addressed key: identical bundles land on the same key,
        // changed bundles get a fresh one.
        let fp = fingerprint(&bytes);
        let key = format!(
            "{}/{}.json",
            StageKind::Collect.artifact_prefix(),
            &fp[..16]
        );

        let decision = self.dedup.decide(&key, &bytes, item.force_rebuild()).await?;
        Ok(decision.into())
    }
}

#[async_trait]
impl StageHandler for CollectStage {
    fn kind(&self) -> StageKind {
        StageKind::Collect
    }

    async fn handle(&self, item: &WorkItem) -> Result<ProcessingOutcome, StageError> {
        match item.operation.as_str() {
            op if op == StageKind::Collect.signal_operation() => {
                self.fan_out_sources(item).await
            }
            op if op == StageKind::Collect.item_operation() => self.collect_source(item).await,
            other => Ok(unsupported_operation(StageKind::Collect, other)),
        }
    }
}
