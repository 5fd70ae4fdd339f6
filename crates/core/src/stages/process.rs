//! Process stage: turn collected bundles into articles.

use std::sync::Arc;

use async_trait::async_trait;

use crate::artifact::ArtifactStore;
use crate::dedup::ContentDeduplicator;
use crate::queue::QueueTransport;
use crate::worker::{ProcessingOutcome, StageError, StageHandler, StageKind, WorkItem};

use super::traits::{ArticleGenerator, SourceBundle};
use super::{artifact_ref_from, fan_out_items, fan_out_outcome, unsupported_operation};

/// Stage handler for the process stage.
pub struct ProcessStage {
    artifacts: Arc<dyn ArtifactStore>,
    generator: Arc<dyn ArticleGenerator>,
    dedup: Arc<ContentDeduplicator>,
    queue: Arc<dyn QueueTransport>,
}

impl ProcessStage {
    pub fn new(
        artifacts: Arc<dyn ArtifactStore>,
        generator: Arc<dyn ArticleGenerator>,
        dedup: Arc<ContentDeduplicator>,
        queue: Arc<dyn QueueTransport>,
    ) -> Self {
        Self {
            artifacts,
            generator,
            dedup,
            queue,
        }
    }

    async fn process_item(&self, item: &WorkItem) -> Result<ProcessingOutcome, StageError> {
        let artifact_ref = artifact_ref_from(item)?;
        let bytes = self.artifacts.get(&artifact_ref).await?;

        let bundle: SourceBundle = serde_json::from_slice(&bytes).map_err(|e| {
            StageError::InvalidPayload(format!(
                "artifact {} is not a source bundle: {}",
                artifact_ref, e
            ))
        })?;

        let article = self.generator.generate(&bundle).await?;
        let article_bytes = serde_json::to_vec_pretty(&article)?;

        let key = format!(
            "{}/{}.json",
            StageKind::Process.artifact_prefix(),
            article.slug
        );

        let decision = self
            .dedup
            .decide(&key, &article_bytes, item.force_rebuild())
            .await?;
        Ok(decision.into())
    }
}

#[async_trait]
impl StageHandler for ProcessStage {
    fn kind(&self) -> StageKind {
        StageKind::Process
    }

    async fn handle(&self, item: &WorkItem) -> Result<ProcessingOutcome, StageError> {
        match item.operation.as_str() {
            op if op == StageKind::Process.signal_operation() => {
                let refs = self
                    .artifacts
                    .list(StageKind::Collect.artifact_prefix())
                    .await?;
                let enqueued = fan_out_items(
                    &self.queue,
                    StageKind::Process,
                    &item.batch_id,
                    refs,
                    item.force_rebuild(),
                )
                .await?;
                Ok(fan_out_outcome(enqueued))
            }
            op if op == StageKind::Process.item_operation() => self.process_item(item).await,
            other => Ok(unsupported_operation(StageKind::Process, other)),
        }
    }
}
