// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use taskstream_core::{
    ConnectionDirectory, EventBus, InstanceId, KeyValueStore, SessionManager, TaskOrchestrator,
};

use crate::config::ServerConfig;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    pub instance: InstanceId,
    /// Live streams held by this instance.
    pub sessions: SessionManager,
    /// Tasks submitted to this instance.
    pub tasks: Arc<TaskOrchestrator>,
}

impl AppState {
    pub fn new(sessions: SessionManager, tasks: Arc<TaskOrchestrator>) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            instance: sessions.instance().clone(),
            sessions,
            tasks,
        })
    }

    /// Wire a session manager and orchestrator over the given backends.
    pub fn from_config(
        config: &ServerConfig,
        bus: Arc<dyn EventBus>,
        store: Arc<dyn KeyValueStore>,
    ) -> Arc<Self> {
        let directory = ConnectionDirectory::new(store, config.directory_ttl());
        let sessions = SessionManager::new(config.instance(), directory, config.session_config());
        let tasks = Arc::new(TaskOrchestrator::new(
            bus,
            Arc::new(config.simulated_work()),
            config.max_subtasks,
        ));
        Self::new(sessions, tasks)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
