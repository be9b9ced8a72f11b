// crates/edge/src/policy.rs
use std::sync::atomic::{AtomicUsize, Ordering};

use clap::ValueEnum;
use rand::Rng;
use serde::Serialize;

/// Deployment-wide routing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Policy {
    /// Cycle through backends for every request.
    RoundRobin,
    /// Uniform random backend for every request.
    Random,
    /// Pin streaming requests to one backend per session, round-robin the rest.
    Sticky,
}

impl Policy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Policy::RoundRobin => "round-robin",
            Policy::Random => "random",
            Policy::Sticky => "sticky",
        }
    }
}

/// How a sticky session picks its first backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Fallback {
    RoundRobin,
    Random,
}

/// Shared backend selector. The round-robin counter is global to the edge.
#[derive(Debug, Default)]
pub struct Selector {
    counter: AtomicUsize,
}

impl Selector {
    pub fn round_robin(&self, backends: usize) -> usize {
        self.counter.fetch_add(1, Ordering::Relaxed) % backends
    }

    pub fn random(backends: usize) -> usize {
        rand::thread_rng().gen_range(0..backends)
    }

    pub fn pick(&self, fallback: Fallback, backends: usize) -> usize {
        match fallback {
            Fallback::RoundRobin => self.round_robin(backends),
            Fallback::Random => Self::random(backends),
        }
    }
}
