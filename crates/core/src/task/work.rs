// crates/core/src/task/work.rs
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use taskstream_types::TaskRequest;

use crate::error::TaskError;

/// One unit of subtask work. The returned value becomes the `result` of
/// the `SUBTASK_COMPLETED` event.
#[async_trait]
pub trait SubtaskWork: Send + Sync + 'static {
    async fn run(&self, request: &TaskRequest, index: u32) -> Result<serde_json::Value, TaskError>;
}

/// Sleeps a random delay in `[min_delay, max_delay)` and succeeds.
#[derive(Debug, Clone)]
pub struct SimulatedWork {
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl SimulatedWork {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay,
        }
    }

    fn pick_delay(&self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        rand::thread_rng().gen_range(self.min_delay..self.max_delay)
    }
}

impl Default for SimulatedWork {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(10))
    }
}

#[async_trait]
impl SubtaskWork for SimulatedWork {
    async fn run(&self, _request: &TaskRequest, index: u32) -> Result<serde_json::Value, TaskError> {
        let delay = self.pick_delay();
        tokio::time::sleep(delay).await;
        Ok(serde_json::Value::String(format!("subtask {index} result")))
    }
}
