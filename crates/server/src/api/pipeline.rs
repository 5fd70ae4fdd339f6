//! Pipeline status and manual trigger endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use conveyor_core::{AuditEvent, Severity, StageKind, Trigger, WorkItem, WorkerStatus};

use crate::api::errors::internal_error;
use crate::api::middleware::AuthUser;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct PipelineStatusResponse {
    pub stages: Vec<StageStatus>,
}

#[derive(Debug, Serialize)]
pub struct StageStatus {
    #[serde(flatten)]
    pub worker: WorkerStatus,
    /// Live queue depth at request time.
    pub queue_depth: u64,
}

/// Current status of every stage worker plus live queue depths.
pub async fn get_status(State(state): State<Arc<AppState>>) -> Response {
    let mut stages = Vec::new();

    for worker in state.workers() {
        let status = worker.status().await;
        let queue_depth = match state.queue().depth(worker.stage().queue_name()).await {
            Ok(depth) => depth,
            Err(e) => {
                return internal_error(
                    &state,
                    &e,
                    serde_json::json!({"stage": worker.stage().as_str(), "operation": "depth"}),
                    Severity::Medium,
                );
            }
        };
        stages.push(StageStatus {
            worker: status,
            queue_depth,
        });
    }

    Json(PipelineStatusResponse { stages }).into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct TriggerRequest {
    /// Rewrite artifacts even when fingerprints already exist.
    #[serde(default)]
    pub force_rebuild: bool,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub stage: String,
    pub message_id: i64,
}

/// Enqueue a manual run of one stage.
pub async fn trigger_stage(
    State(state): State<Arc<AppState>>,
    Path(stage): Path<String>,
    AuthUser(user_id): AuthUser,
    body: Option<Json<TriggerRequest>>,
) -> Response {
    let Ok(stage) = stage.parse::<StageKind>() else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": format!("unknown stage: {}", stage)})),
        )
            .into_response();
    };

    let request = body.map(|Json(r)| r).unwrap_or_default();

    let mut item = WorkItem::new(stage.signal_operation(), Trigger::Manual);
    if request.force_rebuild {
        item = item.with_payload(serde_json::json!({"force_rebuild": true}));
    }

    let bytes = match item.to_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            return internal_error(
                &state,
                &e,
                serde_json::json!({"stage": stage.as_str(), "operation": "trigger"}),
                Severity::High,
            );
        }
    };

    let message_id = match state.queue().send(stage.queue_name(), &bytes).await {
        Ok(id) => id,
        Err(e) => {
            return internal_error(
                &state,
                &e,
                serde_json::json!({"stage": stage.as_str(), "operation": "trigger"}),
                Severity::High,
            );
        }
    };

    state
        .audit()
        .emit(AuditEvent::ManualTriggerRequested {
            stage: stage.as_str().to_string(),
            requested_by: user_id,
            force_rebuild: request.force_rebuild,
        })
        .await;

    Json(TriggerResponse {
        stage: stage.as_str().to_string(),
        message_id,
    })
    .into_response()
}
