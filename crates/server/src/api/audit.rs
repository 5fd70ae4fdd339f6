use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use conveyor_core::{AuditFilter, AuditRecord, Severity};

use crate::api::errors::internal_error;
use crate::state::AppState;

/// Maximum allowed limit for audit queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for audit queries
const DEFAULT_LIMIT: i64 = 100;

/// Query parameters for audit endpoint
#[derive(Debug, Deserialize)]
pub struct AuditQueryParams {
    /// Filter by stage
    pub stage: Option<String>,
    /// Filter by batch ID
    pub batch_id: Option<String>,
    /// Filter by event type
    pub event_type: Option<String>,
    /// Filter by user ID
    pub user_id: Option<String>,
    /// Filter events after this timestamp (ISO 8601)
    pub from: Option<DateTime<Utc>>,
    /// Filter events before this timestamp (ISO 8601)
    pub to: Option<DateTime<Utc>>,
    /// Maximum number of events to return (default 100, max 1000)
    pub limit: Option<i64>,
    /// Pagination offset (default 0)
    pub offset: Option<i64>,
}

/// Response for audit query endpoint
#[derive(Debug, Serialize)]
pub struct AuditQueryResponse {
    /// List of audit events
    pub events: Vec<AuditRecord>,
    /// Total number of matching events
    pub total: i64,
    /// Limit used for this query
    pub limit: i64,
    /// Offset used for this query
    pub offset: i64,
}

/// Query audit events
pub async fn query_audit(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuditQueryParams>,
) -> Response {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    // Base filter is shared between query and count
    let mut base_filter = AuditFilter::new();

    if let Some(ref stage) = params.stage {
        base_filter = base_filter.with_stage(stage);
    }

    if let Some(ref batch_id) = params.batch_id {
        base_filter = base_filter.with_batch_id(batch_id);
    }

    if let Some(ref event_type) = params.event_type {
        base_filter = base_filter.with_event_type(event_type);
    }

    if let Some(ref user_id) = params.user_id {
        base_filter = base_filter.with_user_id(user_id);
    }

    if params.from.is_some() || params.to.is_some() {
        base_filter = base_filter.with_time_range(params.from, params.to);
    }

    let query_filter = AuditFilter {
        limit,
        offset,
        ..base_filter.clone()
    };

    let events = match state.audit_store().query(&query_filter) {
        Ok(events) => events,
        Err(e) => {
            return internal_error(
                &state,
                &e,
                serde_json::json!({"operation": "audit_query"}),
                Severity::Medium,
            );
        }
    };

    let total = match state.audit_store().count(&base_filter) {
        Ok(count) => count,
        Err(e) => {
            return internal_error(
                &state,
                &e,
                serde_json::json!({"operation": "audit_count"}),
                Severity::Medium,
            );
        }
    };

    Json(AuditQueryResponse {
        events,
        total,
        limit,
        offset,
    })
    .into_response()
}
