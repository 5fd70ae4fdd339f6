//! Dead-letter inspection endpoint.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use conveyor_core::{DeadLetter, Severity};

use crate::api::errors::internal_error;
use crate::state::AppState;

const MAX_LIMIT: usize = 500;
const DEFAULT_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct DeadLetterParams {
    /// Filter by queue name
    pub queue: Option<String>,
    /// Maximum number of entries (default 100, max 500)
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct DeadLetterResponse {
    pub dead_letters: Vec<DeadLetter>,
}

/// List dead-lettered messages, newest first.
pub async fn list_dead_letters(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DeadLetterParams>,
) -> Response {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    match state
        .queue()
        .dead_letters(params.queue.as_deref(), limit)
        .await
    {
        Ok(dead_letters) => Json(DeadLetterResponse { dead_letters }).into_response(),
        Err(e) => internal_error(
            &state,
            &e,
            serde_json::json!({"operation": "dead_letters"}),
            Severity::Medium,
        ),
    }
}
