// crates/edge/src/config.rs
//! Command-line and environment configuration for `taskstream-edge`.

use std::net::IpAddr;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::affinity::AffinityStore;
use crate::backend::Backend;
use crate::policy::{Fallback, Policy};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one --backend is required")]
    NoBackends,

    #[error("--{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskstream-edge",
    version,
    about = "Sticky reverse proxy in front of taskstream instances"
)]
pub struct EdgeConfig {
    #[arg(long, env = "EDGE_PORT", default_value_t = 8080)]
    pub port: u16,

    #[arg(long, env = "EDGE_BIND_ADDR", default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// `URI[=weight][@instance]`, repeatable.
    #[arg(
        long = "backend",
        env = "EDGE_BACKENDS",
        value_delimiter = ',',
        default_values = ["http://localhost:9090", "http://localhost:9091"]
    )]
    pub backends: Vec<Backend>,

    #[arg(long, env = "EDGE_POLICY", value_enum, default_value_t = Policy::Sticky)]
    pub policy: Policy,

    /// First pick for a session with no pin and no directory entry.
    #[arg(long, env = "EDGE_STICKY_FALLBACK", value_enum, default_value_t = Fallback::RoundRobin)]
    pub sticky_fallback: Fallback,

    #[arg(long, env = "EDGE_AFFINITY_TTL_SECS", default_value_t = 3600)]
    pub affinity_ttl_secs: u64,

    #[arg(long, env = "EDGE_AFFINITY_MAX_ENTRIES", default_value_t = 100_000)]
    pub affinity_max_entries: usize,

    /// Largest `POST /api/events` body buffered to find its session id.
    #[arg(long, env = "EDGE_MAX_BODY_BYTES", default_value_t = 65_536)]
    pub max_body_bytes: usize,

    /// Connection directory to consult for session owners.
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,
}

impl EdgeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backends.is_empty() {
            return Err(ConfigError::NoBackends);
        }
        if self.affinity_ttl_secs == 0 {
            return Err(ConfigError::Zero("affinity-ttl-secs"));
        }
        if self.affinity_max_entries == 0 {
            return Err(ConfigError::Zero("affinity-max-entries"));
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Zero("max-body-bytes"));
        }
        Ok(())
    }

    pub fn affinity_store(&self) -> AffinityStore {
        AffinityStore::new(
            Duration::from_secs(self.affinity_ttl_secs),
            self.affinity_max_entries,
        )
    }
}
