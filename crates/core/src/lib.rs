// crates/core/src/lib.rs
//! Fleet-side machinery for taskstream: the event bus, the connection
//! directory, task orchestration and streaming sessions.

pub mod bus;
pub mod consumer;
pub mod directory;
pub mod error;
pub mod identity;
pub mod kv;
#[cfg(feature = "redis")]
pub mod redis_backend;
pub mod session;
pub mod task;

pub use bus::{EventBus, EventStream, InMemoryBus, DEFAULT_TOPIC};
pub use consumer::start_event_consumer;
pub use directory::{ConnectionDirectory, DEFAULT_DIRECTORY_TTL};
pub use error::{BusError, SessionError, StoreError, TaskError};
pub use identity::{derive_instance_id, InstanceId};
pub use kv::{InMemoryStore, KeyValueStore};
#[cfg(feature = "redis")]
pub use redis_backend::{RedisBus, RedisStore};
pub use session::{CloseReason, Delivery, SessionConfig, SessionManager, SessionStream};
pub use task::{SimulatedWork, SubtaskWork, TaskOrchestrator, TaskProgress};
