use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // System events
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    // Drain cycle lifecycle
    /// A worker started draining its inbound queue.
    DrainCycleStarted {
        stage: String,
    },
    /// A drain cycle reached DONE.
    DrainCycleCompleted {
        stage: String,
        /// Messages leased over the whole cycle
        messages_leased: u64,
        /// Outcomes that produced a new artifact
        artifacts_created: u64,
        /// Messages whose handler failed (abandoned for retry)
        artifacts_failed: u64,
        /// Outcomes that matched an existing fingerprint
        duplicates_skipped: u64,
        /// Empty polls consumed while waiting out stragglers
        empty_polls: u32,
        duration_ms: u64,
        /// Why the cycle ended: "grace_exhausted", "iteration_cap",
        /// "time_cap" or "shutdown"
        reason: String,
    },

    // Per-message outcomes
    /// A new artifact was persisted and its fingerprint recorded.
    ArtifactCreated {
        stage: String,
        batch_id: String,
        fingerprint: String,
        artifact_ref: String,
    },
    /// The output fingerprint already existed; no artifact written.
    DuplicateSkipped {
        stage: String,
        batch_id: String,
        fingerprint: String,
    },
    /// The stage handler failed for a valid message.
    HandlerFailed {
        stage: String,
        batch_id: Option<String>,
        message_id: i64,
        error: String,
        dequeue_count: u32,
        /// false once the message was dead-lettered instead
        will_retry: bool,
    },
    /// A message exceeded its retry budget and was moved aside.
    MessageDeadLettered {
        stage: String,
        message_id: i64,
        dequeue_count: u32,
        reason: String,
    },
    /// A message could not be decoded at all.
    PoisonMessage {
        stage: String,
        message_id: i64,
        error: String,
    },

    // Stage chaining
    /// A completion signal was posted to the downstream queue.
    StageSignaled {
        from_stage: String,
        to_stage: String,
        artifacts_created: u64,
        artifacts_failed: u64,
        message_id: i64,
    },

    // Operator actions
    /// An operator requested a manual run of a stage.
    ManualTriggerRequested {
        stage: String,
        requested_by: String,
        force_rebuild: bool,
    },
}

impl AuditEvent {
    /// Returns the event type as a string for storage
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::DrainCycleStarted { .. } => "drain_cycle_started",
            Self::DrainCycleCompleted { .. } => "drain_cycle_completed",
            Self::ArtifactCreated { .. } => "artifact_created",
            Self::DuplicateSkipped { .. } => "duplicate_skipped",
            Self::HandlerFailed { .. } => "handler_failed",
            Self::MessageDeadLettered { .. } => "message_dead_lettered",
            Self::PoisonMessage { .. } => "poison_message",
            Self::StageSignaled { .. } => "stage_signaled",
            Self::ManualTriggerRequested { .. } => "manual_trigger_requested",
        }
    }

    /// Extract the stage name if this event is stage-scoped
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::DrainCycleStarted { stage, .. }
            | Self::DrainCycleCompleted { stage, .. }
            | Self::ArtifactCreated { stage, .. }
            | Self::DuplicateSkipped { stage, .. }
            | Self::HandlerFailed { stage, .. }
            | Self::MessageDeadLettered { stage, .. }
            | Self::PoisonMessage { stage, .. }
            | Self::ManualTriggerRequested { stage, .. } => Some(stage),
            Self::StageSignaled { from_stage, .. } => Some(from_stage),
            _ => None,
        }
    }

    /// Extract the batch_id if this event belongs to one logical batch
    pub fn batch_id(&self) -> Option<&str> {
        match self {
            Self::ArtifactCreated { batch_id, .. }
            | Self::DuplicateSkipped { batch_id, .. } => Some(batch_id),
            Self::HandlerFailed { batch_id, .. } => batch_id.as_deref(),
            _ => None,
        }
    }

    /// Extract user_id if this event was triggered by an operator action
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::ManualTriggerRequested { requested_by, .. } => Some(requested_by),
            _ => None,
        }
    }
}

/// A stored audit record with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub stage: Option<String>,
    pub batch_id: Option<String>,
    pub user_id: Option<String>,
    pub data: AuditEvent,
}
