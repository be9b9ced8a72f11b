// crates/core/src/error.rs
use thiserror::Error;

use taskstream_types::ValidationError;

/// Errors publishing to or subscribing from the event bus.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Failed to encode event {event_id}: {source}")]
    Encode {
        event_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Event bus is closed")]
    Closed,

    #[error("Event bus backend error: {0}")]
    Backend(String),
}

/// Errors from the shared key/value store behind the connection directory.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Key/value store unavailable: {0}")]
    Unavailable(String),

    #[error("Key/value store {op} failed for {key}: {message}")]
    Backend {
        op: &'static str,
        key: String,
        message: String,
    },
}

/// Errors opening or driving a streaming session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid stream request: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Could not deliver the initial event for session {session_id}")]
    InitialSend { session_id: String },
}

/// Errors submitting or running a task.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Invalid task request: {0}")]
    Invalid(#[from] ValidationError),

    #[error("A task for session {0} is already running on this instance")]
    AlreadyRunning(String),

    #[error("Subtask {index} failed: {message}")]
    Subtask { index: u32, message: String },

    #[error("Task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    pub fn subtask(index: u32, message: impl Into<String>) -> Self {
        Self::Subtask {
            index,
            message: message.into(),
        }
    }
}
