// crates/server/src/routes/mod.rs
//! API route handlers for the taskstream server.

pub mod events;
pub mod health;
pub mod metrics;
pub mod tasks;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined router.
///
/// Routes:
/// - POST /api/tasks - Submit a task (202 Accepted)
/// - GET  /api/tasks - Tasks running on this instance
/// - GET  /api/tasks/{sessionId} - Progress of one task
/// - GET  /api/events/{sessionId} - SSE stream, closes on the first terminal event
/// - POST /api/events - SSE stream tracking a set of task ids
/// - GET  /api/health - Health check
/// - GET  /metrics - Prometheus metrics
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", tasks::router())
        .nest("/api", events::router())
        .merge(metrics::router())
        .with_state(state)
}
