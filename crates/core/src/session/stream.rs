// crates/core/src/session/stream.rs
use tokio::sync::mpsc;
use tracing::debug;

use taskstream_types::TaskEvent;

use super::{CloseReason, SessionManager};

/// Receiving half of an open session, owned by the transport.
///
/// Dropping it before the session finishes closes the session as
/// `client_disconnected`. A newer session opened under the same id is left
/// alone.
pub struct SessionStream {
    session_id: String,
    generation: u64,
    rx: mpsc::Receiver<TaskEvent>,
    manager: SessionManager,
}

impl SessionStream {
    pub(crate) fn new(
        session_id: String,
        generation: u64,
        rx: mpsc::Receiver<TaskEvent>,
        manager: SessionManager,
    ) -> Self {
        Self {
            session_id,
            generation,
            rx,
            manager,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Next event, or `None` once the session has been closed and drained.
    pub async fn recv(&mut self) -> Option<TaskEvent> {
        self.rx.recv().await
    }
}

impl Drop for SessionStream {
    fn drop(&mut self) {
        if !self.manager.store().is_current(&self.session_id, self.generation) {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        debug!(session_id = %self.session_id, "Stream dropped by client");
        let manager = self.manager.clone();
        let session_id = std::mem::take(&mut self.session_id);
        let generation = self.generation;
        handle.spawn(async move {
            manager
                .close_generation(&session_id, generation, CloseReason::ClientDisconnected)
                .await;
        });
    }
}
