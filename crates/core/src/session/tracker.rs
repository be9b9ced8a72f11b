// crates/core/src/session/tracker.rs
//! Decides when a stream has seen everything it is waiting for.

use std::collections::HashSet;

use taskstream_types::{belongs_to_session, TaskEvent};

/// What a terminal event means for the stream that received it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Keep streaming.
    Open,
    /// Every tracked id has finished; send `ALL_TASKS_COMPLETED` and close.
    AllTracked,
    /// Nothing is tracked and a terminal event arrived; close.
    SessionEnded,
}

/// Per-session completion state.
///
/// `completed` only ever grows and is always a subset of `tracked`, so set
/// equality reduces to comparing lengths.
#[derive(Debug, Default)]
pub struct CompletionTracker {
    tracked: HashSet<String>,
    completed: HashSet<String>,
}

impl CompletionTracker {
    pub fn new(tracked: impl IntoIterator<Item = String>) -> Self {
        Self {
            tracked: tracked.into_iter().collect(),
            completed: HashSet::new(),
        }
    }

    pub fn is_tracking(&self) -> bool {
        !self.tracked.is_empty()
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    pub fn observe(&mut self, event: &TaskEvent) -> Completion {
        if !event.final_event {
            return Completion::Open;
        }
        if self.tracked.is_empty() {
            return Completion::SessionEnded;
        }

        if self.tracked.contains(&event.event_id) {
            self.completed.insert(event.event_id.clone());
        }

        // A terminal event for the task as a whole finishes its subtasks too.
        let address = event.address();
        if address.is_session_scope() {
            for id in &self.tracked {
                if belongs_to_session(id, &address.session_id) {
                    self.completed.insert(id.clone());
                }
            }
        }

        if self.completed.len() == self.tracked.len() {
            Completion::AllTracked
        } else {
            Completion::Open
        }
    }
}
