// crates/types/src/request.rs
//! Inbound request bodies and their validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_SESSION_ID_LEN: usize = 128;
const MAX_TASK_NAME_LEN: usize = 256;
/// A tracked id is a session id plus a `-<index>` suffix.
const MAX_TRACKED_ID_LEN: usize = MAX_SESSION_ID_LEN + 11;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("sessionId must not be empty")]
    EmptySessionId,

    #[error("sessionId exceeds {MAX_SESSION_ID_LEN} characters")]
    SessionIdTooLong,

    #[error("sessionId contains invalid character {0:?}")]
    InvalidSessionIdChar(char),

    #[error("taskName exceeds {MAX_TASK_NAME_LEN} characters")]
    TaskNameTooLong,

    #[error("subtaskCount {requested} exceeds the limit of {max}")]
    TooManySubtasks { requested: u32, max: u32 },

    #[error("trackedTaskIds contains an invalid id: {0:?}")]
    InvalidTrackedId(String),
}

/// Session ids travel in URL paths, bus keys and directory keys, so they
/// are restricted to a conservative character set. Dashes are allowed:
/// event addressing does not depend on them.
pub fn validate_session_id(session_id: &str) -> Result<(), ValidationError> {
    if session_id.is_empty() {
        return Err(ValidationError::EmptySessionId);
    }
    if session_id.len() > MAX_SESSION_ID_LEN {
        return Err(ValidationError::SessionIdTooLong);
    }
    if let Some(c) = session_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '-')))
    {
        return Err(ValidationError::InvalidSessionIdChar(c));
    }
    Ok(())
}

/// Body of a task submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    #[serde(alias = "correlationId")]
    pub session_id: String,
    #[serde(default)]
    pub task_name: String,
    #[serde(default, alias = "numberOfSubtasks")]
    pub subtask_count: u32,
}

impl TaskRequest {
    pub fn new(session_id: impl Into<String>, task_name: impl Into<String>, subtask_count: u32) -> Self {
        Self {
            session_id: session_id.into(),
            task_name: task_name.into(),
            subtask_count,
        }
    }

    pub fn validate(&self, max_subtasks: u32) -> Result<(), ValidationError> {
        validate_session_id(&self.session_id)?;
        if self.task_name.len() > MAX_TASK_NAME_LEN {
            return Err(ValidationError::TaskNameTooLong);
        }
        if self.subtask_count > max_subtasks {
            return Err(ValidationError::TooManySubtasks {
                requested: self.subtask_count,
                max: max_subtasks,
            });
        }
        Ok(())
    }
}

/// Body of `POST /api/events`: open a stream, optionally tracking a set of
/// task ids that must all finish before the stream closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRequest {
    #[serde(alias = "correlationId")]
    pub session_id: String,
    #[serde(default, alias = "taskIds")]
    pub tracked_task_ids: Option<Vec<String>>,
}

impl StreamRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_session_id(&self.session_id)?;
        for id in self.tracked_task_ids.iter().flatten() {
            if id.is_empty() || id.len() > MAX_TRACKED_ID_LEN {
                return Err(ValidationError::InvalidTrackedId(id.clone()));
            }
        }
        Ok(())
    }
}
