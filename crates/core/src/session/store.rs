// crates/core/src/session/store.rs
use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use taskstream_types::{belongs_to_session, TaskEvent};

use super::tracker::CompletionTracker;

/// Why a push did not reach the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushError {
    /// The session was already closed; nothing to do.
    Closed,
    /// Channel full past the send timeout, or the receiver is gone.
    Failed,
}

/// The single writer for one connection. Holding the lock is the only way
/// to push, which keeps data events and heartbeats from interleaving.
pub(crate) struct SessionWriter {
    tx: Option<mpsc::Sender<TaskEvent>>,
    pub(crate) tracker: CompletionTracker,
}

impl SessionWriter {
    pub(crate) async fn push(
        &mut self,
        event: TaskEvent,
        timeout: std::time::Duration,
    ) -> Result<(), PushError> {
        let Some(tx) = self.tx.as_ref() else {
            return Err(PushError::Closed);
        };
        if tx.send_timeout(event, timeout).await.is_err() {
            self.tx = None;
            return Err(PushError::Failed);
        }
        Ok(())
    }

    /// Drop the sender. The client sees end-of-stream once it drains.
    pub(crate) fn release(&mut self) {
        self.tx = None;
    }
}

/// One open stream.
pub struct StreamSession {
    pub session_id: String,
    /// Distinguishes successive sessions opened under the same id.
    pub generation: u64,
    pub opened_at: Instant,
    /// Tracked task ids. Fixed for the life of the session.
    tracked: HashSet<String>,
    pub(crate) writer: Mutex<SessionWriter>,
    pub(crate) heartbeat: CancellationToken,
}

impl StreamSession {
    pub(crate) fn new(
        session_id: String,
        generation: u64,
        tracked: Vec<String>,
        tx: mpsc::Sender<TaskEvent>,
    ) -> Self {
        Self {
            session_id,
            generation,
            opened_at: Instant::now(),
            tracked: tracked.iter().cloned().collect(),
            writer: Mutex::new(SessionWriter {
                tx: Some(tx),
                tracker: CompletionTracker::new(tracked),
            }),
            heartbeat: CancellationToken::new(),
        }
    }
}

impl StreamSession {
    /// True if events of task `task_id` count toward this session's tracked
    /// set, either as the task itself or through one of its subtasks.
    pub fn tracks_task(&self, task_id: &str) -> bool {
        self.tracked.contains(task_id)
            || self
                .tracked
                .iter()
                .any(|id| belongs_to_session(id, task_id))
    }
}

/// Concurrent map of open sessions, keyed by session id.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<StreamSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, returning the session previously stored under the same id.
    pub fn insert(&self, session: Arc<StreamSession>) -> Option<Arc<StreamSession>> {
        self.sessions.insert(session.session_id.clone(), session)
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<StreamSession>> {
        self.sessions.get(session_id).map(|s| Arc::clone(s.value()))
    }

    pub fn remove(&self, session_id: &str) -> Option<Arc<StreamSession>> {
        self.sessions.remove(session_id).map(|(_, s)| s)
    }

    /// Remove only if the stored session is still `generation`.
    pub fn remove_generation(&self, session_id: &str, generation: u64) -> Option<Arc<StreamSession>> {
        self.sessions
            .remove_if(session_id, |_, s| s.generation == generation)
            .map(|(_, s)| s)
    }

    pub fn is_current(&self, session_id: &str, generation: u64) -> bool {
        self.sessions
            .get(session_id)
            .is_some_and(|s| s.generation == generation)
    }

    pub fn ids(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Tracked ids, deduplicated, from an optional request list.
pub(crate) fn tracked_ids(ids: Option<Vec<String>>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter()
        .flatten()
        .filter(|id| seen.insert(id.clone()))
        .collect()
}
