// crates/server/src/routes/events.rs
//! Event streams.
//!
//! - `GET  /api/events/{sessionId}` -- stream until the first terminal event
//! - `POST /api/events`             -- `{sessionId, trackedTaskIds?}`; with
//!   tracked ids the stream ends after `ALL_TASKS_COMPLETED`
//!
//! Each frame is `event: <STATUS>`, `id: <eventId>-<millis>`,
//! `data: <TaskEvent JSON>`. Heartbeats come from the session itself, so no
//! SSE keep-alive comments are added.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::sse::{Event, Sse},
    routing::{get, post},
    Json, Router,
};
use tokio_stream::Stream;

use taskstream_core::SessionStream;
use taskstream_types::{StreamRequest, TaskEvent};

use crate::error::ApiResult;
use crate::state::AppState;

fn frame(event: &TaskEvent) -> Result<Event, axum::Error> {
    Event::default()
        .event(event.status.as_str())
        .id(event.sse_id())
        .json_data(event)
}

fn sse(session: SessionStream) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = async_stream::stream! {
        let mut session = session;
        while let Some(event) = session.recv().await {
            match frame(&event) {
                Ok(frame) => yield Ok(frame),
                Err(e) => tracing::warn!(event_id = %event.event_id, error = %e, "Failed to encode SSE frame"),
            }
        }
    };
    Sse::new(stream)
}

/// GET /api/events/{sessionId}
async fn stream_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let session = state.sessions.open(&session_id, None).await?;
    Ok(sse(session))
}

/// POST /api/events
async fn stream_tracked(
    State(state): State<Arc<AppState>>,
    body: Result<Json<StreamRequest>, JsonRejection>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let Json(request) = body?;
    request
        .validate()
        .map_err(|e| crate::error::ApiError::BadRequest(e.to_string()))?;
    let session = state
        .sessions
        .open(&request.session_id, request.tracked_task_ids)
        .await?;
    Ok(sse(session))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/events", post(stream_tracked))
        .route("/events/{session_id}", get(stream_session))
}
