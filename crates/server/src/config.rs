// crates/server/src/config.rs
//! Command-line and environment configuration for the `taskstream` binary.

use std::net::IpAddr;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use taskstream_core::{InstanceId, SessionConfig, SimulatedWork, DEFAULT_TOPIC};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("--{0} must be greater than zero")]
    Zero(&'static str),

    #[error("--subtask-min-delay-ms ({min}) exceeds --subtask-max-delay-ms ({max})")]
    DelayRange { min: u64, max: u64 },

    #[error("--cluster-id {0:?} must be non-empty and must not contain ':'")]
    ClusterId(String),
}

/// One server instance of the fleet.
#[derive(Debug, Clone, Parser)]
#[command(name = "taskstream", version, about = "Task submission and event streaming server")]
pub struct ServerConfig {
    #[arg(long, env = "PORT", default_value_t = 9090)]
    pub port: u16,

    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0")]
    pub bind: IpAddr,

    #[arg(long, env = "CLUSTER_ID", default_value = "cluster-1")]
    pub cluster_id: String,

    /// Defaults to an id derived from the hostname and port.
    #[arg(long, env = "INSTANCE_ID")]
    pub instance_id: Option<String>,

    #[arg(long, env = "HEARTBEAT_INITIAL_DELAY_MS", default_value_t = 2000)]
    pub heartbeat_initial_delay_ms: u64,

    #[arg(long, env = "HEARTBEAT_INTERVAL_SECS", default_value_t = 10)]
    pub heartbeat_interval_secs: u64,

    #[arg(long, env = "SEND_TIMEOUT_MS", default_value_t = 5000)]
    pub send_timeout_ms: u64,

    /// 0 disables the limit.
    #[arg(long, env = "SESSION_MAX_LIFETIME_SECS", default_value_t = 1800)]
    pub session_max_lifetime_secs: u64,

    #[arg(long, env = "CHANNEL_CAPACITY", default_value_t = 64)]
    pub channel_capacity: usize,

    #[arg(long, env = "DIRECTORY_TTL_SECS", default_value_t = 86_400)]
    pub directory_ttl_secs: u64,

    #[arg(long, env = "SUBTASK_MIN_DELAY_MS", default_value_t = 2000)]
    pub subtask_min_delay_ms: u64,

    #[arg(long, env = "SUBTASK_MAX_DELAY_MS", default_value_t = 10_000)]
    pub subtask_max_delay_ms: u64,

    #[arg(long, env = "MAX_SUBTASKS", default_value_t = 100)]
    pub max_subtasks: u32,

    /// Check the connection directory before delivering an event locally.
    #[arg(long, env = "VERIFY_OWNERSHIP")]
    pub verify_ownership: bool,

    #[arg(long, env = "CONSUMER_WORKERS", default_value_t = 4)]
    pub consumer_workers: usize,

    /// Shared Redis for the event bus and directory. Without it the server
    /// runs standalone with in-process backends.
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    #[arg(long, env = "EVENT_TOPIC", default_value = DEFAULT_TOPIC)]
    pub topic: String,
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Directory values are `instance:cluster`, split at the last ':'.
        if self.cluster_id.is_empty() || self.cluster_id.contains(':') {
            return Err(ConfigError::ClusterId(self.cluster_id.clone()));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Zero("heartbeat-interval-secs"));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Zero("channel-capacity"));
        }
        if self.directory_ttl_secs == 0 {
            return Err(ConfigError::Zero("directory-ttl-secs"));
        }
        if self.consumer_workers == 0 {
            return Err(ConfigError::Zero("consumer-workers"));
        }
        if self.subtask_min_delay_ms > self.subtask_max_delay_ms {
            return Err(ConfigError::DelayRange {
                min: self.subtask_min_delay_ms,
                max: self.subtask_max_delay_ms,
            });
        }
        Ok(())
    }

    pub fn instance(&self) -> InstanceId {
        match &self.instance_id {
            Some(id) => InstanceId::new(id.clone(), self.cluster_id.clone()),
            None => InstanceId::from_hostname(self.port, self.cluster_id.clone()),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            heartbeat_initial_delay: Duration::from_millis(self.heartbeat_initial_delay_ms),
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            send_timeout: Duration::from_millis(self.send_timeout_ms),
            max_lifetime: (self.session_max_lifetime_secs > 0)
                .then(|| Duration::from_secs(self.session_max_lifetime_secs)),
            channel_capacity: self.channel_capacity,
            verify_ownership: self.verify_ownership,
        }
    }

    pub fn simulated_work(&self) -> SimulatedWork {
        SimulatedWork::new(
            Duration::from_millis(self.subtask_min_delay_ms),
            Duration::from_millis(self.subtask_max_delay_ms),
        )
    }

    pub fn directory_ttl(&self) -> Duration {
        Duration::from_secs(self.directory_ttl_secs)
    }
}
