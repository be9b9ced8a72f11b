// crates/server/src/routes/metrics.rs
//! `GET /metrics` scrape endpoint.
//!
//! Point-in-time gauges are refreshed from [`AppState`] on every scrape so a
//! scrape reflects this instance even when no stream has opened or closed
//! since the last one.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use metrics::gauge;

use crate::metrics::render_metrics;
use crate::state::AppState;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub async fn scrape(State(state): State<Arc<AppState>>) -> Response {
    gauge!("taskstream_sessions_active").set(state.sessions.active_count() as f64);
    gauge!("taskstream_uptime_seconds").set(state.uptime_secs() as f64);

    let Some(body) = render_metrics() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response();
    };
    ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body).into_response()
}

/// Mounted at the root rather than under `/api`.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/metrics", get(scrape))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use clap::Parser;
    use tower::ServiceExt;

    use crate::{init_metrics, Backends, ServerConfig};

    #[tokio::test]
    async fn test_scrape_exposes_taskstream_series() {
        init_metrics();
        let config = ServerConfig::parse_from(["taskstream", "--instance-id", "pod-m-9090"]);
        let backends = Backends::in_memory(&config.topic);
        let state = AppState::from_config(&config, backends.bus, backends.store);

        let response = router()
            .with_state(state)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            PROMETHEUS_CONTENT_TYPE
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("taskstream_sessions_active"));
        assert!(text.contains("taskstream_uptime_seconds"));
    }
}
