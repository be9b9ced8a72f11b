// crates/edge/src/lib.rs
//! Edge router for a taskstream fleet.
//!
//! Event streams (`/api/events...`) are pinned per session so a client keeps
//! talking to the instance that holds its stream. Everything else is spread
//! by the configured policy. `GET /edge/health` is answered here.

pub mod affinity;
pub mod backend;
pub mod config;
pub mod directory;
pub mod error;
pub mod extract;
pub mod policy;
pub mod proxy;
pub mod router;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request},
    response::Response,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::backend::Backend;
use crate::error::RouteError;
use crate::policy::{Fallback, Policy};
use crate::proxy::HttpClient;
use crate::router::EdgeRouter;

pub use crate::config::EdgeConfig;

const AFFINITY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct EdgeState {
    pub router: Arc<EdgeRouter>,
    pub client: HttpClient,
    pub max_body_bytes: usize,
    pub start_time: Instant,
}

impl EdgeState {
    pub fn new(router: EdgeRouter, max_body_bytes: usize) -> Self {
        Self {
            router: Arc::new(router),
            client: proxy::http_client(),
            max_body_bytes,
            start_time: Instant::now(),
        }
    }
}

pub fn app(state: EdgeState) -> Router {
    // Background sweep of idle affinity pins
    let cleanup_state = state.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(AFFINITY_SWEEP_INTERVAL).await;
            let purged = cleanup_state.router.affinity().purge_expired();
            debug!(purged, "cleaned idle affinity entries");
        }
    });

    Router::new()
        .route("/edge/health", get(health))
        .fallback(forward)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeHealth {
    pub status: &'static str,
    pub policy: Policy,
    pub sticky_fallback: Fallback,
    pub backends: Vec<Backend>,
    pub affinity_entries: usize,
    pub directory: bool,
    pub uptime_secs: u64,
}

async fn health(State(state): State<EdgeState>) -> Json<EdgeHealth> {
    let router = &state.router;
    Json(EdgeHealth {
        status: "ok",
        policy: router.policy(),
        sticky_fallback: router.fallback(),
        backends: router.backends().to_vec(),
        affinity_entries: router.affinity().len(),
        directory: router.has_directory(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

async fn forward(
    State(state): State<EdgeState>,
    req: Request<Body>,
) -> Result<Response, RouteError> {
    let (req, session_id) = if extract::is_streaming_path(req.uri().path()) {
        streaming_session(req, state.max_body_bytes).await?
    } else {
        (req, None)
    };

    let route = state.router.route(session_id.as_deref()).await;
    let backend = state.router.backend(route.backend);
    debug!(
        method = %req.method(),
        path = %req.uri().path(),
        session_id = session_id.as_deref().unwrap_or("-"),
        backend = %backend,
        source = ?route.source,
        "Routing request"
    );
    proxy::forward(&state.client, backend, req).await
}

/// Session id of a streaming request. A `POST` body is buffered up to
/// `limit` bytes and handed on unchanged.
async fn streaming_session(
    req: Request<Body>,
    limit: usize,
) -> Result<(Request<Body>, Option<String>), RouteError> {
    if let Some(id) = extract::session_from_path(req.uri().path()) {
        let id = id.to_owned();
        return Ok((req, Some(id)));
    }
    if req.method() != Method::POST {
        return Ok((req, None));
    }

    let (parts, body) = req.into_parts();
    let bytes = extract::read_bounded(body, limit).await?;
    let session_id = extract::session_from_body(&bytes);
    Ok((Request::from_parts(parts, Body::from(bytes)), session_id))
}
