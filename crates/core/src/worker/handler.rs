//! The seam between the drain loop and stage-specific logic.

use async_trait::async_trait;
use thiserror::Error;

use crate::artifact::ArtifactError;
use crate::dedup::DedupError;
use crate::queue::QueueError;

use super::types::{ProcessingOutcome, StageKind, WorkItem};

/// Error type for stage handler failures.
///
/// Any error returned from a handler abandons the message for retry;
/// the taxonomy exists for logging and for tests.
#[derive(Debug, Error)]
pub enum StageError {
    /// The payload decoded but does not carry what this stage needs.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Upstream content source failed.
    #[error("source fetch failed: {0}")]
    Source(String),

    /// Article generation failed.
    #[error("generation failed: {0}")]
    Generate(String),

    /// Page rendering failed.
    #[error("render failed: {0}")]
    Render(String),

    /// Publishing failed.
    #[error("publish failed: {0}")]
    Publish(String),

    #[error(transparent)]
    Dedup(#[from] DedupError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One pipeline stage's processing logic.
///
/// Implementations must be idempotent with respect to an unchanged
/// dedup store: the transport delivers at least once, and a redelivered
/// message must collapse to a `Duplicate` outcome rather than a second
/// artifact.
#[async_trait]
pub trait StageHandler: Send + Sync {
    /// Which stage this handler implements.
    fn kind(&self) -> StageKind;

    /// Handle one work item to completion.
    ///
    /// Returning `Ok` means the item is finished and its message may be
    /// deleted, whatever the outcome status. Returning `Err` abandons
    /// the message for redelivery.
    async fn handle(&self, item: &WorkItem) -> Result<ProcessingOutcome, StageError>;
}
