// crates/core/src/session/mod.rs
//! Streaming sessions: one live server-push connection per session id on
//! the instance that accepted it.
//!
//! - `store`: concurrent map of open sessions
//! - `manager`: open / deliver / heartbeat / close
//! - `stream`: the receiving half handed to the transport
//! - `tracker`: tracked-task completion

pub mod manager;
pub mod store;
pub mod stream;
pub mod tracker;

use std::fmt;
use std::time::Duration;

pub use manager::SessionManager;
pub use store::SessionStore;
pub use stream::SessionStream;
pub use tracker::{Completion, CompletionTracker};

/// Why a session was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    Completed,
    ClientDisconnected,
    DeliveryFailed,
    Timeout,
    Replaced,
    Shutdown,
}

impl CloseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::ClientDisconnected => "client_disconnected",
            Self::DeliveryFailed => "delivery_failed",
            Self::Timeout => "timeout",
            Self::Replaced => "replaced",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of handing one bus event to the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// No live session for this event on this instance.
    NotLocal,
    /// The directory says another instance owns the session.
    NotOwner,
    Delivered,
    /// Delivered, and the session closed as complete.
    Finished,
    /// The push failed and the session was closed.
    Failed,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub heartbeat_initial_delay: Duration,
    pub heartbeat_interval: Duration,
    /// Upper bound on a single push to a slow client.
    pub send_timeout: Duration,
    pub max_lifetime: Option<Duration>,
    pub channel_capacity: usize,
    /// Consult the directory before delivering locally.
    pub verify_ownership: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_initial_delay: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(10),
            send_timeout: Duration::from_secs(5),
            max_lifetime: Some(Duration::from_secs(30 * 60)),
            channel_capacity: 64,
            verify_ownership: false,
        }
    }
}
