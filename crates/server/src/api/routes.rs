use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::{audit, dead_letters, handlers, pipeline};
use super::middleware::{auth_middleware, metrics_middleware};
use crate::metrics::encode_metrics_for;
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Authenticated API routes
    let api_routes = Router::new()
        .route("/config", get(handlers::get_config))
        // Audit
        .route("/audit", get(audit::query_audit))
        // Pipeline
        .route("/pipeline/status", get(pipeline::get_status))
        .route("/pipeline/{stage}/trigger", post(pipeline::trigger_stage))
        // Dead letters
        .route("/dead-letters", get(dead_letters::list_dead_letters))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth_middleware,
        ))
        .with_state(Arc::clone(&state));

    // Health stays unauthenticated: external health checks probe it.
    let open_routes = Router::new()
        .route("/health", get(handlers::health))
        .with_state(Arc::clone(&state));

    let metrics_state = Arc::clone(&state);
    Router::new()
        .nest("/api/v1", api_routes.merge(open_routes))
        .route(
            "/metrics",
            get(move || {
                let state = Arc::clone(&metrics_state);
                async move { encode_metrics_for(&state).await }
            }),
        )
        .layer(middleware::from_fn(metrics_middleware))
}
