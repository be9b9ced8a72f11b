// crates/edge/src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("No backends configured")]
    NoBackends,

    #[error("Request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("Could not read request body: {0}")]
    Body(String),

    #[error("Backend {backend} failed: {message}")]
    Upstream { backend: String, message: String },
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        let status = match &self {
            RouteError::NoBackends => StatusCode::SERVICE_UNAVAILABLE,
            RouteError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            RouteError::Body(_) => StatusCode::BAD_REQUEST,
            RouteError::Upstream { backend, message } => {
                tracing::warn!(%backend, error = %message, "Proxy request failed");
                StatusCode::BAD_GATEWAY
            }
        };
        let body = ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("Error")
                .to_string(),
            details: Some(self.to_string()),
        };
        (status, Json(body)).into_response()
    }
}
