// crates/edge/src/extract.rs
//! Find the session a streaming request belongs to.

use axum::body::Body;
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde::Deserialize;

use crate::error::RouteError;

pub const STREAM_PATH: &str = "/api/events";

pub fn is_streaming_path(path: &str) -> bool {
    path == STREAM_PATH
        || path
            .strip_prefix(STREAM_PATH)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// `GET /api/events/{sessionId}`.
pub fn session_from_path(path: &str) -> Option<&str> {
    path.strip_prefix(STREAM_PATH)?
        .strip_prefix('/')?
        .split('/')
        .next()
        .filter(|id| !id.is_empty())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionFields {
    session_id: Option<String>,
    correlation_id: Option<String>,
}

/// `sessionId` (or its `correlationId` alias) from a JSON request body.
pub fn session_from_body(body: &[u8]) -> Option<String> {
    let fields: SessionFields = serde_json::from_slice(body).ok()?;
    fields
        .session_id
        .or(fields.correlation_id)
        .filter(|id| !id.is_empty())
}

/// Buffer at most `limit` bytes of a request body.
pub async fn read_bounded(body: Body, limit: usize) -> Result<Bytes, RouteError> {
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) if err.is::<LengthLimitError>() => Err(RouteError::BodyTooLarge { limit }),
        Err(err) => Err(RouteError::Body(err.to_string())),
    }
}
