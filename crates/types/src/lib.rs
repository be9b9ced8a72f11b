// crates/types/src/lib.rs
//! Shared data model for taskstream.
//!
//! Everything that crosses a process boundary lives here: task submissions,
//! stream subscriptions, and the lifecycle events that travel over the bus
//! and out to clients as server-sent events.

pub mod event;
pub mod request;

pub use event::{belongs_to_session, parent_stream_id, EventAddress, EventStatus, TaskEvent};
pub use request::{
    validate_session_id, StreamRequest, TaskRequest, ValidationError, MAX_SESSION_ID_LEN,
};
