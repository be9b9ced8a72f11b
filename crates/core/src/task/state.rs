// crates/core/src/task/state.rs
//! Atomic state tracking for a single task.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::RwLock;

use tokio::time::Instant;

use super::types::{TaskPhase, TaskProgress};

const NO_SUBTASK: u32 = u32::MAX;

/// Progress of one task.
///
/// Counters are atomics so status reads never wait on the worker; only the
/// message and finish time sit behind a lock.
pub struct TaskState {
    session_id: String,
    task_name: String,
    total: u32,
    phase: AtomicU8,
    completed: AtomicU32,
    current: AtomicU32,
    message: RwLock<Option<String>>,
    finished_at: RwLock<Option<Instant>>,
}

impl TaskState {
    pub fn new(session_id: impl Into<String>, task_name: impl Into<String>, total: u32) -> Self {
        Self {
            session_id: session_id.into(),
            task_name: task_name.into(),
            total,
            phase: AtomicU8::new(TaskPhase::Initiated as u8),
            completed: AtomicU32::new(0),
            current: AtomicU32::new(NO_SUBTASK),
            message: RwLock::new(None),
            finished_at: RwLock::new(None),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn phase(&self) -> TaskPhase {
        TaskPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn set_processing(&self) {
        self.set_phase(TaskPhase::Processing);
    }

    pub fn subtask_started(&self, index: u32) {
        self.current.store(index, Ordering::Relaxed);
        self.set_phase(TaskPhase::SubtaskRunning);
    }

    /// Returns the number of subtasks completed so far.
    pub fn subtask_completed(&self) -> u32 {
        let done = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        self.set_phase(TaskPhase::SubtaskCompleted);
        done
    }

    pub fn complete(&self) {
        self.current.store(NO_SUBTASK, Ordering::Relaxed);
        self.set_phase(TaskPhase::Completed);
        self.mark_finished();
    }

    pub fn fail(&self, error: impl Into<String>) {
        match self.message.write() {
            Ok(mut guard) => *guard = Some(error.into()),
            Err(e) => tracing::error!("RwLock poisoned writing task error: {e}"),
        }
        self.set_phase(TaskPhase::Failed);
        self.mark_finished();
    }

    /// Time since the task reached a terminal phase.
    pub fn finished_for(&self) -> Option<std::time::Duration> {
        match self.finished_at.read() {
            Ok(guard) => guard.map(|at| at.elapsed()),
            Err(e) => {
                tracing::error!("RwLock poisoned reading finish time: {e}");
                None
            }
        }
    }

    pub fn snapshot(&self) -> TaskProgress {
        let current = self.current.load(Ordering::Relaxed);
        TaskProgress {
            session_id: self.session_id.clone(),
            task_name: self.task_name.clone(),
            phase: self.phase().as_str().to_string(),
            completed_subtasks: self.completed.load(Ordering::Relaxed),
            total_subtasks: self.total,
            current_subtask: (current != NO_SUBTASK).then_some(current),
            message: match self.message.read() {
                Ok(g) => g.clone(),
                Err(e) => {
                    tracing::error!("RwLock poisoned reading task message: {e}");
                    None
                }
            },
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn set_phase(&self, phase: TaskPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    fn mark_finished(&self) {
        match self.finished_at.write() {
            Ok(mut guard) => *guard = Some(Instant::now()),
            Err(e) => tracing::error!("RwLock poisoned writing finish time: {e}"),
        }
    }
}
