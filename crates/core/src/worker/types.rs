//! Types shared across the stage coordinator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::queue::QueueError;

/// The fixed, closed set of pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Collect,
    Process,
    Render,
    Publish,
}

impl StageKind {
    pub const ALL: [StageKind; 4] = [
        StageKind::Collect,
        StageKind::Process,
        StageKind::Render,
        StageKind::Publish,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collect => "collect",
            Self::Process => "process",
            Self::Render => "render",
            Self::Publish => "publish",
        }
    }

    /// Name of this stage's inbound queue.
    pub fn queue_name(&self) -> &'static str {
        self.as_str()
    }

    /// The downstream stage, if any.
    pub fn next(&self) -> Option<StageKind> {
        match self {
            Self::Collect => Some(Self::Process),
            Self::Process => Some(Self::Render),
            Self::Render => Some(Self::Publish),
            Self::Publish => None,
        }
    }

    /// Operation discriminator of "work available" signals into this stage.
    pub fn signal_operation(&self) -> &'static str {
        match self {
            Self::Collect => "collect_requested",
            Self::Process => "process_requested",
            Self::Render => "build_requested",
            Self::Publish => "publish_requested",
        }
    }

    /// Operation discriminator of per-item work on this stage's queue.
    pub fn item_operation(&self) -> &'static str {
        match self {
            Self::Collect => "collect_source",
            Self::Process => "process_item",
            Self::Render => "render_page",
            Self::Publish => "publish_page",
        }
    }

    /// Artifact store prefix this stage writes under.
    pub fn artifact_prefix(&self) -> &'static str {
        match self {
            Self::Collect => "collected",
            Self::Process => "articles",
            Self::Render => "pages",
            Self::Publish => "published",
        }
    }
}

impl std::str::FromStr for StageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "collect" => Ok(Self::Collect),
            "process" => Ok(Self::Process),
            "render" => Ok(Self::Render),
            "publish" => Ok(Self::Publish),
            other => Err(format!("unknown stage: {}", other)),
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a message was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    QueueEmpty,
    Manual,
    Scheduled,
}

/// Artifact counts carried by stage-completion signals.
///
/// Receivers must refuse to act when `artifacts_created` is zero; the
/// producer already validates before sending, and the double check keeps
/// a miscounting bug anywhere in the chain from cascading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentSummary {
    pub artifacts_created: u64,
    #[serde(default)]
    pub artifacts_failed: u64,
    #[serde(default)]
    pub force_rebuild: bool,
}

/// Error decoding an inbound message body into a WorkItem.
#[derive(Debug, Error)]
pub enum WorkItemError {
    /// The `operation` discriminator is missing or empty. Poison: log
    /// and remove, never retry.
    #[error("missing operation discriminator")]
    MissingOperation,

    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// The stage-specific domain payload decoded from a queue message body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    /// Correlates all messages from one upstream trigger.
    pub batch_id: String,
    /// Stage-specific discriminator, e.g. "process_item" or "build_requested".
    pub operation: String,
    /// Stage-specific fields.
    #[serde(default)]
    pub payload: serde_json::Value,
    pub trigger: Trigger,
    pub timestamp: DateTime<Utc>,
    /// Present on stage-completion signals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_summary: Option<ContentSummary>,
}

impl WorkItem {
    /// Build a fresh item for the given operation.
    pub fn new(operation: impl Into<String>, trigger: Trigger) -> Self {
        Self {
            batch_id: uuid::Uuid::new_v4().to_string(),
            operation: operation.into(),
            payload: serde_json::Value::Object(Default::default()),
            trigger,
            timestamp: Utc::now(),
            content_summary: None,
        }
    }

    pub fn with_batch_id(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = batch_id.into();
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_content_summary(mut self, summary: ContentSummary) -> Self {
        self.content_summary = Some(summary);
        self
    }

    /// Decode a message body, rejecting payloads without a usable
    /// operation discriminator.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WorkItemError> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| WorkItemError::Malformed(e.to_string()))?;

        match value.get("operation").and_then(|op| op.as_str()) {
            Some(op) if !op.is_empty() => {}
            _ => return Err(WorkItemError::MissingOperation),
        }

        serde_json::from_value(value).map_err(|e| WorkItemError::Malformed(e.to_string()))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// A completion signal explicitly claiming zero new artifacts.
    /// Receivers skip these outright.
    pub fn is_zero_artifact_signal(&self) -> bool {
        self.content_summary
            .as_ref()
            .is_some_and(|s| s.artifacts_created == 0)
    }

    /// Whether this item requests overwriting existing content.
    pub fn force_rebuild(&self) -> bool {
        self.content_summary
            .as_ref()
            .is_some_and(|s| s.force_rebuild)
            || self
                .payload
                .get("force_rebuild")
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
    }
}

/// Result status of handling one WorkItem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Created,
    Duplicate,
    Skipped,
    Failed,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Duplicate => "duplicate",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

/// The result of handling one WorkItem.
///
/// Invariants: `Created` implies a previously-unseen fingerprint was
/// persisted; `Duplicate` implies the fingerprint already existed and no
/// new artifact was written.
#[derive(Debug, Clone)]
pub struct ProcessingOutcome {
    pub status: OutcomeStatus,
    pub content_fingerprint: Option<String>,
    pub artifact_ref: Option<String>,
    /// Human-readable reason for skips and failures.
    pub detail: Option<String>,
}

impl ProcessingOutcome {
    pub fn created(fingerprint: impl Into<String>, artifact_ref: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Created,
            content_fingerprint: Some(fingerprint.into()),
            artifact_ref: Some(artifact_ref.into()),
            detail: None,
        }
    }

    pub fn duplicate(fingerprint: impl Into<String>, existing_ref: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Duplicate,
            content_fingerprint: Some(fingerprint.into()),
            artifact_ref: Some(existing_ref.into()),
            detail: None,
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Skipped,
            content_fingerprint: None,
            artifact_ref: None,
            detail: Some(reason.into()),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            content_fingerprint: None,
            artifact_ref: None,
            detail: Some(reason.into()),
        }
    }
}

impl From<crate::dedup::DedupDecision> for ProcessingOutcome {
    fn from(decision: crate::dedup::DedupDecision) -> Self {
        match decision {
            crate::dedup::DedupDecision::Created {
                fingerprint,
                artifact_ref,
            } => Self::created(fingerprint, artifact_ref),
            crate::dedup::DedupDecision::Skipped {
                fingerprint,
                artifact_ref,
            } => Self::duplicate(fingerprint, artifact_ref),
        }
    }
}

/// Why a drain cycle reached DONE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainReason {
    /// The configured run of consecutive empty polls elapsed.
    GraceExhausted,
    /// Poll iteration cap hit.
    IterationCap,
    /// Wall-clock cap hit.
    TimeCap,
    /// Shutdown signal received.
    Shutdown,
}

impl DrainReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GraceExhausted => "grace_exhausted",
            Self::IterationCap => "iteration_cap",
            Self::TimeCap => "time_cap",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Per-drain-cycle counters. Owned exclusively by the drain loop that
/// created it; never shared across workers.
#[derive(Debug, Clone)]
pub struct BatchState {
    pub messages_leased: u64,
    pub artifacts_created: u64,
    pub artifacts_failed: u64,
    pub duplicates_skipped: u64,
    pub messages_skipped: u64,
    pub dead_lettered: u64,
    pub consecutive_empty_polls: u32,
    pub session_started_at: DateTime<Utc>,
    /// Set when any handled item requested a forced rebuild; propagated
    /// on the downstream signal.
    pub force_rebuild_requested: bool,
    /// Populated when the cycle reaches DONE.
    pub completion: Option<DrainReason>,
}

impl BatchState {
    pub fn new() -> Self {
        Self {
            messages_leased: 0,
            artifacts_created: 0,
            artifacts_failed: 0,
            duplicates_skipped: 0,
            messages_skipped: 0,
            dead_lettered: 0,
            consecutive_empty_polls: 0,
            session_started_at: Utc::now(),
            force_rebuild_requested: false,
            completion: None,
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        Utc::now() - self.session_started_at
    }
}

impl Default for BatchState {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the most recent completed drain cycle, kept for the
/// health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct DrainSummary {
    pub messages_leased: u64,
    pub artifacts_created: u64,
    pub artifacts_failed: u64,
    pub duplicates_skipped: u64,
    pub duration_seconds: f64,
    pub reason: String,
    pub completed_at: DateTime<Utc>,
}

impl From<&BatchState> for DrainSummary {
    fn from(batch: &BatchState) -> Self {
        Self {
            messages_leased: batch.messages_leased,
            artifacts_created: batch.artifacts_created,
            artifacts_failed: batch.artifacts_failed,
            duplicates_skipped: batch.duplicates_skipped,
            duration_seconds: batch.duration().num_milliseconds() as f64 / 1000.0,
            reason: batch
                .completion
                .map(|r| r.as_str().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            completed_at: Utc::now(),
        }
    }
}

/// Current status of one stage worker.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub stage: String,
    pub running: bool,
    pub queue_depth_hint: u64,
    pub last_drain: Option<DrainSummary>,
}

/// Error type for worker operations.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stage_chain() {
        assert_eq!(StageKind::Collect.next(), Some(StageKind::Process));
        assert_eq!(StageKind::Process.next(), Some(StageKind::Render));
        assert_eq!(StageKind::Render.next(), Some(StageKind::Publish));
        assert_eq!(StageKind::Publish.next(), None);
    }

    #[test]
    fn test_stage_from_str() {
        assert_eq!("render".parse::<StageKind>().unwrap(), StageKind::Render);
        assert!("compile".parse::<StageKind>().is_err());
    }

    #[test]
    fn test_work_item_roundtrip() {
        let item = WorkItem::new("process_item", Trigger::QueueEmpty)
            .with_payload(json!({"artifact_ref": "collected/x.json"}));

        let bytes = item.to_bytes().unwrap();
        let decoded = WorkItem::from_bytes(&bytes).unwrap();

        assert_eq!(decoded.operation, "process_item");
        assert_eq!(decoded.batch_id, item.batch_id);
        assert_eq!(decoded.payload["artifact_ref"], "collected/x.json");
        assert_eq!(decoded.trigger, Trigger::QueueEmpty);
    }

    #[test]
    fn test_missing_operation_is_rejected() {
        let bytes = serde_json::to_vec(&json!({
            "batch_id": "b-1",
            "payload": {},
            "trigger": "manual",
            "timestamp": "2024-06-01T00:00:00Z"
        }))
        .unwrap();

        let result = WorkItem::from_bytes(&bytes);
        assert!(matches!(result, Err(WorkItemError::MissingOperation)));
    }

    #[test]
    fn test_empty_operation_is_rejected() {
        let bytes = serde_json::to_vec(&json!({
            "batch_id": "b-1",
            "operation": "",
            "trigger": "manual",
            "timestamp": "2024-06-01T00:00:00Z"
        }))
        .unwrap();

        let result = WorkItem::from_bytes(&bytes);
        assert!(matches!(result, Err(WorkItemError::MissingOperation)));
    }

    #[test]
    fn test_garbage_bytes_are_malformed() {
        let result = WorkItem::from_bytes(b"not json at all");
        assert!(matches!(result, Err(WorkItemError::Malformed(_))));
    }

    #[test]
    fn test_zero_artifact_signal_detection() {
        let mut item = WorkItem::new("build_requested", Trigger::QueueEmpty);
        assert!(!item.is_zero_artifact_signal());

        item.content_summary = Some(ContentSummary {
            artifacts_created: 0,
            artifacts_failed: 2,
            force_rebuild: false,
        });
        assert!(item.is_zero_artifact_signal());

        item.content_summary = Some(ContentSummary {
            artifacts_created: 3,
            artifacts_failed: 0,
            force_rebuild: false,
        });
        assert!(!item.is_zero_artifact_signal());
    }

    #[test]
    fn test_force_rebuild_from_summary_or_payload() {
        let item = WorkItem::new("build_requested", Trigger::Manual).with_content_summary(
            ContentSummary {
                artifacts_created: 1,
                artifacts_failed: 0,
                force_rebuild: true,
            },
        );
        assert!(item.force_rebuild());

        let item = WorkItem::new("collect_requested", Trigger::Manual)
            .with_payload(json!({"force_rebuild": true}));
        assert!(item.force_rebuild());

        let item = WorkItem::new("collect_requested", Trigger::Manual);
        assert!(!item.force_rebuild());
    }

    #[test]
    fn test_outcome_constructors() {
        let created = ProcessingOutcome::created("fp", "articles/a.json");
        assert_eq!(created.status, OutcomeStatus::Created);
        assert_eq!(created.artifact_ref.as_deref(), Some("articles/a.json"));

        let duplicate = ProcessingOutcome::duplicate("fp", "articles/a.json");
        assert_eq!(duplicate.status, OutcomeStatus::Duplicate);

        let skipped = ProcessingOutcome::skipped("zero-artifact signal");
        assert_eq!(skipped.status, OutcomeStatus::Skipped);
        assert!(skipped.artifact_ref.is_none());
    }

    #[test]
    fn test_batch_state_defaults() {
        let batch = BatchState::new();
        assert_eq!(batch.messages_leased, 0);
        assert_eq!(batch.artifacts_created, 0);
        assert_eq!(batch.consecutive_empty_polls, 0);
        assert!(batch.completion.is_none());
    }

    #[test]
    fn test_drain_summary_from_batch() {
        let mut batch = BatchState::new();
        batch.messages_leased = 5;
        batch.artifacts_created = 3;
        batch.completion = Some(DrainReason::GraceExhausted);

        let summary = DrainSummary::from(&batch);
        assert_eq!(summary.artifacts_created, 3);
        assert_eq!(summary.reason, "grace_exhausted");
    }
}
