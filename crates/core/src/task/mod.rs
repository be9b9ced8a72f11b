// crates/core/src/task/mod.rs
//! Task orchestration: accept a task, run its subtasks in the background,
//! and publish lifecycle events to the bus.
//!
//! Provides:
//! - `TaskOrchestrator`: validates, registers and spawns tasks
//! - `TaskState`: atomic progress for one task
//! - `SubtaskWork`: the pluggable unit of work (`SimulatedWork` by default)
//! - `TaskProgress`: JSON snapshot served by the status endpoints

pub mod runner;
pub mod state;
pub mod types;
pub mod work;

pub use runner::TaskOrchestrator;
pub use state::TaskState;
pub use types::{TaskHandle, TaskPhase, TaskProgress};
pub use work::{SimulatedWork, SubtaskWork};
