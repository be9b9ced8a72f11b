// crates/core/src/task/types.rs
//! Types for task orchestration.

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::error::TaskError;

/// Lifecycle phase of one task.
///
/// `Initiated -> Processing -> (SubtaskRunning -> SubtaskCompleted)* ->
/// Completed | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskPhase {
    Initiated = 0,
    Processing = 1,
    SubtaskRunning = 2,
    SubtaskCompleted = 3,
    Completed = 4,
    Failed = 5,
}

impl TaskPhase {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Initiated,
            1 => Self::Processing,
            2 => Self::SubtaskRunning,
            3 => Self::SubtaskCompleted,
            4 => Self::Completed,
            _ => Self::Failed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Processing => "processing",
            Self::SubtaskRunning => "subtask_running",
            Self::SubtaskCompleted => "subtask_completed",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Handle to a spawned task. Dropping it detaches the task.
pub struct TaskHandle {
    pub session_id: String,
    join: JoinHandle<Result<(), TaskError>>,
}

impl TaskHandle {
    pub(crate) fn new(session_id: String, join: JoinHandle<Result<(), TaskError>>) -> Self {
        Self { session_id, join }
    }

    /// Wait for the task to finish. `None` if the runtime dropped it.
    pub async fn wait(self) -> Option<Result<(), TaskError>> {
        self.join.await.ok()
    }
}

/// Point-in-time view of a task.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProgress {
    pub session_id: String,
    pub task_name: String,
    pub phase: String,
    pub completed_subtasks: u32,
    pub total_subtasks: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_subtask: Option<u32>,
    pub message: Option<String>,
    pub timestamp: String,
}
