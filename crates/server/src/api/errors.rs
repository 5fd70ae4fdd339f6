//! Sanitized error responses for the control API.
//!
//! Internal failures never leak storage errors or paths to callers;
//! they go through the SecureErrorReporter and come out as an error_id
//! plus a generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

use conveyor_core::Severity;

use crate::state::AppState;

/// Log an internal error with context and return the sanitized 500.
pub fn internal_error(
    state: &AppState,
    err: &(dyn std::error::Error + 'static),
    context: Value,
    severity: Severity,
) -> Response {
    let sanitized = state.reporter().report(err, &context, severity);
    let mut response = Json(sanitized).into_response();
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}
