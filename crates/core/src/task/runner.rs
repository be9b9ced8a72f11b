// crates/core/src/task/runner.rs
//! Accepts tasks and runs them in the background, publishing lifecycle
//! events as each step finishes.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures_util::FutureExt;
use metrics::counter;
use tracing::{debug, error, info, warn};

use taskstream_types::{EventAddress, EventStatus, TaskEvent, TaskRequest};

use super::state::TaskState;
use super::types::{TaskHandle, TaskProgress};
use super::work::SubtaskWork;
use crate::bus::EventBus;
use crate::error::TaskError;

/// Finished tasks stay visible to the status endpoints this long.
const RETAIN_FINISHED: Duration = Duration::from_secs(10 * 60);

/// Submits tasks and tracks their progress on this instance.
///
/// `submit` never blocks on the work: it validates, records the task and
/// spawns it. Execution is fail-fast. The first failing subtask ends the
/// task with a single terminal `FAILED` and later subtasks never run.
pub struct TaskOrchestrator {
    bus: Arc<dyn EventBus>,
    work: Arc<dyn SubtaskWork>,
    max_subtasks: u32,
    tasks: RwLock<HashMap<String, Arc<TaskState>>>,
}

impl TaskOrchestrator {
    pub fn new(bus: Arc<dyn EventBus>, work: Arc<dyn SubtaskWork>, max_subtasks: u32) -> Self {
        Self {
            bus,
            work,
            max_subtasks,
            tasks: RwLock::new(HashMap::new()),
        }
    }

    pub fn max_subtasks(&self) -> u32 {
        self.max_subtasks
    }

    /// Validate and start a task. Rejects a second task for a session whose
    /// task is still running here.
    pub fn submit(&self, request: TaskRequest) -> Result<TaskHandle, TaskError> {
        request.validate(self.max_subtasks)?;

        let state = Arc::new(TaskState::new(
            request.session_id.clone(),
            request.task_name.clone(),
            request.subtask_count,
        ));
        match self.tasks.write() {
            Ok(mut tasks) => {
                tasks.retain(|_, t| t.finished_for().map_or(true, |age| age < RETAIN_FINISHED));
                if let Some(existing) = tasks.get(&request.session_id) {
                    if !existing.phase().is_terminal() {
                        return Err(TaskError::AlreadyRunning(request.session_id));
                    }
                }
                tasks.insert(request.session_id.clone(), Arc::clone(&state));
            }
            Err(e) => tracing::error!("RwLock poisoned writing task map: {e}"),
        }

        counter!("taskstream_tasks_submitted_total").increment(1);
        info!(
            session_id = %request.session_id,
            task_name = %request.task_name,
            subtasks = request.subtask_count,
            "Task accepted"
        );

        let session_id = request.session_id.clone();
        let join = tokio::spawn(run_task(
            Arc::clone(&self.bus),
            Arc::clone(&self.work),
            state,
            request,
        ));
        Ok(TaskHandle::new(session_id, join))
    }

    pub fn get(&self, session_id: &str) -> Option<TaskProgress> {
        match self.tasks.read() {
            Ok(tasks) => tasks.get(session_id).map(|t| t.snapshot()),
            Err(e) => {
                tracing::error!("RwLock poisoned reading task map: {e}");
                None
            }
        }
    }

    /// Tasks that have not reached a terminal phase.
    pub fn active(&self) -> Vec<TaskProgress> {
        match self.tasks.read() {
            Ok(tasks) => {
                let mut active: Vec<_> = tasks
                    .values()
                    .filter(|t| !t.phase().is_terminal())
                    .map(|t| t.snapshot())
                    .collect();
                active.sort_by(|a, b| a.session_id.cmp(&b.session_id));
                active
            }
            Err(e) => {
                tracing::error!("RwLock poisoned reading task map: {e}");
                Vec::new()
            }
        }
    }
}

async fn run_task(
    bus: Arc<dyn EventBus>,
    work: Arc<dyn SubtaskWork>,
    state: Arc<TaskState>,
    request: TaskRequest,
) -> Result<(), TaskError> {
    let outcome = AssertUnwindSafe(execute(bus.as_ref(), work.as_ref(), &state, &request))
        .catch_unwind()
        .await;

    let err = match outcome {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(e)) => e,
        Err(panic) => TaskError::Panicked(panic_message(panic.as_ref())),
    };

    error!(session_id = %request.session_id, error = %err, "Task failed");
    state.fail(err.to_string());
    let failed = TaskEvent::new(
        EventAddress::session(&request.session_id),
        EventStatus::Failed,
        format!("task failed: {err}"),
    )
    .terminal();
    publish(bus.as_ref(), &failed).await;
    Err(err)
}

async fn execute(
    bus: &dyn EventBus,
    work: &dyn SubtaskWork,
    state: &TaskState,
    request: &TaskRequest,
) -> Result<(), TaskError> {
    let session_id = &request.session_id;

    state.set_processing();
    let processing = TaskEvent::new(
        EventAddress::session(session_id),
        EventStatus::Processing,
        format!("task {} started", display_name(request)),
    );
    publish(bus, &processing).await;

    for index in 0..request.subtask_count {
        state.subtask_started(index);
        let result = work.run(request, index).await?;
        let done = state.subtask_completed();
        debug!(%session_id, index, done, "Subtask completed");

        let event = TaskEvent::new(
            EventAddress::subtask(session_id, index),
            EventStatus::SubtaskCompleted,
            format!("subtask {index} completed"),
        )
        .with_result(result);
        publish(bus, &event).await;
    }

    state.complete();
    let completed = TaskEvent::new(
        EventAddress::session(session_id),
        EventStatus::Completed,
        format!("task {} completed", display_name(request)),
    )
    .terminal();
    publish(bus, &completed).await;
    info!(%session_id, subtasks = request.subtask_count, "Task completed");
    Ok(())
}

/// Publish failures are logged and dropped.
async fn publish(bus: &dyn EventBus, event: &TaskEvent) {
    match bus.publish(event).await {
        Ok(()) => {
            counter!("taskstream_events_published_total", "status" => event.status.as_str())
                .increment(1);
        }
        Err(e) => {
            counter!("taskstream_publish_failures_total").increment(1);
            warn!(event_id = %event.event_id, status = %event.status, error = %e, "Failed to publish event");
        }
    }
}

fn display_name(request: &TaskRequest) -> &str {
    if request.task_name.is_empty() {
        &request.session_id
    } else {
        &request.task_name
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
