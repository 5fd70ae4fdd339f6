use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use conveyor_core::SanitizedConfig;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    /// Sum of the last observed depths across stage queues. A hint, not
    /// a live count; health checks must stay cheap.
    pub queue_depth_hint: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_drain: Option<LastDrain>,
}

#[derive(Serialize)]
pub struct LastDrain {
    pub stage: String,
    pub artifacts_created: u64,
    pub duration_seconds: f64,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let mut queue_depth_hint = 0;
    let mut last_drain: Option<LastDrain> = None;
    let mut newest = None;

    for worker in state.workers() {
        let status = worker.status().await;
        queue_depth_hint += status.queue_depth_hint;

        if let Some(drain) = status.last_drain {
            if newest.is_none_or(|at| drain.completed_at > at) {
                newest = Some(drain.completed_at);
                last_drain = Some(LastDrain {
                    stage: status.stage.clone(),
                    artifacts_created: drain.artifacts_created,
                    duration_seconds: drain.duration_seconds,
                });
            }
        }
    }

    Json(HealthResponse {
        status: "ok".to_string(),
        queue_depth_hint,
        last_drain,
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}
