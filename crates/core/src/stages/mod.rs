//! Stage handlers for the four pipeline stages.
//!
//! Each stage's queue carries two operations: the stage's completion
//! signal (`*_requested`), which fans out one per-item message for every
//! pending artifact, and the per-item operation, which does the actual
//! work and runs its output through the deduplicator. Fan-out re-enqueues
//! onto the stage's own queue, so the drain loop that handled the signal
//! picks the items up on its next poll within the same cycle.

mod collect;
mod generator;
mod process;
mod publish;
mod publisher;
mod render;
mod renderer;
mod sources;
mod traits;

pub use collect::*;
pub use generator::*;
pub use process::*;
pub use publish::*;
pub use publisher::*;
pub use render::*;
pub use renderer::*;
pub use sources::*;
pub use traits::*;

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use crate::queue::QueueTransport;
use crate::worker::{ProcessingOutcome, StageError, StageKind, Trigger, WorkItem};

/// Enqueue one per-item message on `stage`'s own queue for each
/// artifact reference, preserving the signal's batch id.
pub(crate) async fn fan_out_items(
    queue: &Arc<dyn QueueTransport>,
    stage: StageKind,
    batch_id: &str,
    refs: Vec<String>,
    force_rebuild: bool,
) -> Result<usize, StageError> {
    let mut enqueued = 0;
    for artifact_ref in refs {
        let mut payload = json!({ "artifact_ref": artifact_ref });
        if force_rebuild {
            payload["force_rebuild"] = json!(true);
        }
        let item = WorkItem::new(stage.item_operation(), Trigger::QueueEmpty)
            .with_batch_id(batch_id)
            .with_payload(payload);
        queue
            .send(stage.queue_name(), &item.to_bytes()?)
            .await?;
        enqueued += 1;
    }
    debug!(stage = stage.as_str(), enqueued, batch_id, "fanned out work items");
    Ok(enqueued)
}

/// Outcome for a handled fan-out signal.
pub(crate) fn fan_out_outcome(enqueued: usize) -> ProcessingOutcome {
    ProcessingOutcome::skipped(format!("fanned out {} work items", enqueued))
}

/// Outcome for an operation this stage does not understand. Logged and
/// skipped rather than retried: redelivery cannot fix it.
pub(crate) fn unsupported_operation(stage: StageKind, operation: &str) -> ProcessingOutcome {
    warn!(
        stage = stage.as_str(),
        operation, "unsupported operation, skipping"
    );
    ProcessingOutcome::skipped(format!("unsupported operation: {}", operation))
}

/// Extract the `artifact_ref` field every per-item payload must carry.
pub(crate) fn artifact_ref_from(item: &WorkItem) -> Result<String, StageError> {
    item.payload
        .get("artifact_ref")
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| StageError::InvalidPayload("missing artifact_ref".to_string()))
}
