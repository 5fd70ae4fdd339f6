//! Testing utilities and mock implementations for E2E tests.
//!
//! This module provides mock implementations of the coordinator's
//! external seams (queue transport, artifact store, stage handlers,
//! content collaborators), allowing full pipeline tests without real
//! infrastructure.
//!
//! # Example
//!
//! ```rust,ignore
//! use conveyor_core::testing::{MockHandler, MockQueue, fixtures};
//!
//! let queue = MockQueue::new();
//! let handler = MockHandler::new(StageKind::Collect);
//! handler.set_created_outcomes().await;
//!
//! queue.push("collect", fixtures::work_item_bytes("collect_source")).await;
//! // Drive a BatchDrainLoop against them...
//! ```

mod mock_artifact_store;
mod mock_handler;
mod mock_queue;
mod mock_source;

pub use mock_artifact_store::MockArtifactStore;
pub use mock_handler::MockHandler;
pub use mock_queue::MockQueue;
pub use mock_source::{MockContentSource, MockPublisher};

/// Test fixtures and helper functions.
pub mod fixtures {
    use serde_json::json;

    use crate::stages::{SourceBundle, SourceDocument};
    use crate::worker::{ContentSummary, Trigger, WorkItem};

    /// A work item with reasonable defaults for the given operation.
    pub fn work_item(operation: &str) -> WorkItem {
        WorkItem::new(operation, Trigger::QueueEmpty)
    }

    /// Serialized bytes of a default work item.
    pub fn work_item_bytes(operation: &str) -> Vec<u8> {
        work_item(operation).to_bytes().unwrap()
    }

    /// A per-item message pointing at an artifact.
    pub fn item_for_artifact(operation: &str, artifact_ref: &str) -> WorkItem {
        work_item(operation).with_payload(json!({ "artifact_ref": artifact_ref }))
    }

    /// A completion signal claiming `created` new artifacts.
    pub fn completion_signal(operation: &str, created: u64) -> WorkItem {
        work_item(operation).with_content_summary(ContentSummary {
            artifacts_created: created,
            artifacts_failed: 0,
            force_rebuild: false,
        })
    }

    /// A source document with reasonable defaults.
    pub fn source_document(id: &str, body: &str) -> SourceDocument {
        SourceDocument {
            source_id: id.to_string(),
            title: format!("Document {}", id),
            body: body.to_string(),
            url: Some(format!("https://example.org/{}", id)),
            published_at: None,
        }
    }

    /// A bundle holding the given documents.
    pub fn source_bundle(source: &str, docs: Vec<SourceDocument>) -> SourceBundle {
        SourceBundle::new(source, docs)
    }
}
