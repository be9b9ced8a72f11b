// crates/server/src/routes/tasks.rs
//! Task submission and status.
//!
//! - `POST /api/tasks`             -- accept a task (202)
//! - `GET  /api/tasks`             -- tasks still running on this instance
//! - `GET  /api/tasks/{sessionId}` -- progress of one task

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;

use taskstream_core::TaskProgress;
use taskstream_types::TaskRequest;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub session_id: String,
    pub message: String,
}

/// POST /api/tasks -- validate, start in the background, return at once.
async fn submit_task(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TaskRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let Json(request) = body?;
    let handle = state.tasks.submit(request)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            session_id: handle.session_id,
            message: "task accepted".to_string(),
        }),
    ))
}

async fn list_tasks(State(state): State<Arc<AppState>>) -> Json<Vec<TaskProgress>> {
    Json(state.tasks.active())
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<TaskProgress>> {
    state
        .tasks
        .get(&session_id)
        .map(Json)
        .ok_or(ApiError::TaskNotFound(session_id))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks", get(list_tasks).post(submit_task))
        .route("/tasks/{session_id}", get(get_task))
}
