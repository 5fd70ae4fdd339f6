//! Render stage: turn articles into servable pages.

use std::sync::Arc;

use async_trait::async_trait;

use crate::artifact::ArtifactStore;
use crate::dedup::ContentDeduplicator;
use crate::queue::QueueTransport;
use crate::worker::{ProcessingOutcome, StageError, StageHandler, StageKind, WorkItem};

use super::traits::{GeneratedArticle, SiteRenderer};
use super::{artifact_ref_from, fan_out_items, fan_out_outcome, unsupported_operation};

/// Stage handler for the render stage.
pub struct RenderStage {
    artifacts: Arc<dyn ArtifactStore>,
    renderer: Arc<dyn SiteRenderer>,
    dedup: Arc<ContentDeduplicator>,
    queue: Arc<dyn QueueTransport>,
}

impl RenderStage {
    pub fn new(
        artifacts: Arc<dyn ArtifactStore>,
        renderer: Arc<dyn SiteRenderer>,
        dedup: Arc<ContentDeduplicator>,
        queue: Arc<dyn QueueTransport>,
    ) -> Self {
        Self {
            artifacts,
            renderer,
            dedup,
            queue,
        }
    }

    async fn render_page(&self, item: &WorkItem) -> Result<ProcessingOutcome, StageError> {
        let artifact_ref = artifact_ref_from(item)?;
        let bytes = self.artifacts.get(&artifact_ref).await?;

        let article: GeneratedArticle = serde_json::from_slice(&bytes).map_err(|e| {
            StageError::InvalidPayload(format!(
                "artifact {} is not an article: {}",
                artifact_ref, e
            ))
        })?;

        let html = self.renderer.render(&article).await?;
        let key = format!(
            "{}/{}.html",
            StageKind::Render.artifact_prefix(),
            article.slug
        );

        let decision = self
            .dedup
            .decide(&key, html.as_bytes(), item.force_rebuild())
            .await?;
        Ok(decision.into())
    }
}

#[async_trait]
impl StageHandler for RenderStage {
    fn kind(&self) -> StageKind {
        StageKind::Render
    }

    async fn handle(&self, item: &WorkItem) -> Result<ProcessingOutcome, StageError> {
        match item.operation.as_str() {
            op if op == StageKind::Render.signal_operation() => {
                let refs = self
                    .artifacts
                    .list(StageKind::Process.artifact_prefix())
                    .await?;
                let enqueued = fan_out_items(
                    &self.queue,
                    StageKind::Render,
                    &item.batch_id,
                    refs,
                    item.force_rebuild(),
                )
                .await?;
                Ok(fan_out_outcome(enqueued))
            }
            op if op == StageKind::Render.item_operation() => self.render_page(item).await,
            other => Ok(unsupported_operation(StageKind::Render, other)),
        }
    }
}
