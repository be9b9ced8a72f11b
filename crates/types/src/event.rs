// crates/types/src/event.rs
//! Task lifecycle events and their addressing.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status carried by every [`TaskEvent`].
///
/// The serialized form doubles as the SSE `event:` name, so clients can
/// `addEventListener("SUBTASK_COMPLETED", ...)` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Connected,
    Processing,
    SubtaskCompleted,
    Completed,
    Failed,
    Heartbeat,
    AllTasksCompleted,
}

impl EventStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "CONNECTED",
            Self::Processing => "PROCESSING",
            Self::SubtaskCompleted => "SUBTASK_COMPLETED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Heartbeat => "HEARTBEAT",
            Self::AllTasksCompleted => "ALL_TASKS_COMPLETED",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who an event is for: a whole session, or one subtask of it.
///
/// Carried as two typed fields so the owning session never has to be
/// reconstructed from a flattened string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventAddress {
    pub session_id: String,
    pub subtask_index: Option<u32>,
}

impl EventAddress {
    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            subtask_index: None,
        }
    }

    pub fn subtask(session_id: impl Into<String>, index: u32) -> Self {
        Self {
            session_id: session_id.into(),
            subtask_index: Some(index),
        }
    }

    pub fn is_session_scope(&self) -> bool {
        self.subtask_index.is_none()
    }

    /// Flattened id shown to clients: `sessionId` or `sessionId-<index>`.
    pub fn event_id(&self) -> String {
        match self.subtask_index {
            Some(index) => format!("{}-{}", self.session_id, index),
            None => self.session_id.clone(),
        }
    }

    /// Recover an address from a bare event id (payloads from older
    /// publishers that only carried `correlationId`).
    ///
    /// Only a trailing `-<digits>` suffix is treated as a subtask index, so
    /// `order-fund` stays a session id while `order-fund-3` is subtask 3 of
    /// `order-fund`.
    pub fn from_legacy_id(event_id: &str) -> Self {
        if let Some((prefix, suffix)) = event_id.rsplit_once('-') {
            if !prefix.is_empty() && is_index(suffix) {
                if let Ok(index) = suffix.parse::<u32>() {
                    return Self::subtask(prefix, index);
                }
            }
        }
        Self::session(event_id)
    }
}

impl fmt::Display for EventAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.subtask_index {
            Some(index) => write!(f, "{}-{}", self.session_id, index),
            None => f.write_str(&self.session_id),
        }
    }
}

/// True if `event_id` names `session_id` itself or one of its subtasks.
pub fn belongs_to_session(event_id: &str, session_id: &str) -> bool {
    if event_id == session_id {
        return true;
    }
    event_id
        .strip_prefix(session_id)
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(is_index)
}

/// Stream that submitted `task_id` as one of its tracked tasks: everything
/// before the last `-`, so `conn-A` and `conn-2` both belong to `conn`.
pub fn parent_stream_id(task_id: &str) -> Option<&str> {
    let (prefix, suffix) = task_id.rsplit_once('-')?;
    (!prefix.is_empty() && !suffix.is_empty()).then_some(prefix)
}

fn is_index(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// A lifecycle event, as published on the bus and pushed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEvent {
    #[serde(alias = "correlationId")]
    pub event_id: String,
    /// Empty only for legacy payloads; see [`TaskEvent::address`].
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtask_index: Option<u32>,
    pub status: EventStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub final_event: bool,
    /// Unix epoch milliseconds at creation.
    #[serde(default)]
    pub timestamp: i64,
}

impl TaskEvent {
    pub fn new(address: EventAddress, status: EventStatus, message: impl Into<String>) -> Self {
        Self {
            event_id: address.event_id(),
            session_id: address.session_id,
            subtask_index: address.subtask_index,
            status,
            message: message.into(),
            result: None,
            final_event: false,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn connected(session_id: &str) -> Self {
        Self::new(
            EventAddress::session(session_id),
            EventStatus::Connected,
            "stream connected",
        )
    }

    pub fn heartbeat(session_id: &str) -> Self {
        Self::new(
            EventAddress::session(session_id),
            EventStatus::Heartbeat,
            "heartbeat",
        )
    }

    pub fn all_tasks_completed(session_id: &str) -> Self {
        Self::new(
            EventAddress::session(session_id),
            EventStatus::AllTasksCompleted,
            "all tracked tasks finished",
        )
        .terminal()
    }

    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }

    /// Mark as the last event of its subtask (or of the whole session).
    pub fn terminal(mut self) -> Self {
        self.final_event = true;
        self
    }

    /// The typed address, falling back to legacy id parsing when the
    /// publisher did not send `sessionId`.
    pub fn address(&self) -> EventAddress {
        if self.session_id.is_empty() {
            EventAddress::from_legacy_id(&self.event_id)
        } else {
            EventAddress {
                session_id: self.session_id.clone(),
                subtask_index: self.subtask_index,
            }
        }
    }

    /// SSE `id:` field. Unique per push even when the same event id repeats.
    pub fn sse_id(&self) -> String {
        format!("{}-{}", self.event_id, self.timestamp)
    }
}
