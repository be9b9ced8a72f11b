// crates/server/src/lib.rs
//! Taskstream server library.
//!
//! Accepts tasks, runs them in the background, and streams their lifecycle
//! events to clients as server-sent events. Several instances can share one
//! event bus and connection directory; each delivers only to the streams it
//! holds.

pub mod backends;
pub mod config;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod state;

pub use backends::{Backends, DIRECTORY_SWEEP_INTERVAL};
pub use config::{ConfigError, ServerConfig};
pub use error::*;
pub use metrics::{init_metrics, render_metrics};
pub use routes::api_routes;
pub use state::AppState;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
///
/// CORS allows any origin, method and header.
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Integration Tests
// ============================================================================
