// crates/edge/src/router.rs
//! Backend choice per request.
//!
//! Sticky resolution for a session: live local pin, then the owner recorded
//! in the connection directory, then the fallback selector. Whatever is chosen
//! is pinned before the request is forwarded. A directory that cannot be
//! reached is treated as having no answer.

use taskstream_core::ConnectionDirectory;
use tracing::{debug, warn};

use crate::affinity::AffinityStore;
use crate::backend::Backend;
use crate::error::RouteError;
use crate::policy::{Fallback, Policy, Selector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteSource {
    /// Round-robin or random pick with no session involved.
    Selected,
    /// Existing local pin.
    Affinity,
    /// Owner found in the connection directory.
    Directory,
    /// New pin from the fallback selector.
    Pinned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub backend: usize,
    pub source: RouteSource,
}

pub struct EdgeRouter {
    backends: Vec<Backend>,
    policy: Policy,
    fallback: Fallback,
    selector: Selector,
    affinity: AffinityStore,
    directory: Option<ConnectionDirectory>,
}

impl EdgeRouter {
    pub fn new(
        backends: Vec<Backend>,
        policy: Policy,
        fallback: Fallback,
        affinity: AffinityStore,
        directory: Option<ConnectionDirectory>,
    ) -> Result<Self, RouteError> {
        if backends.is_empty() {
            return Err(RouteError::NoBackends);
        }
        Ok(Self {
            backends,
            policy,
            fallback,
            selector: Selector::default(),
            affinity,
            directory,
        })
    }

    pub fn backends(&self) -> &[Backend] {
        &self.backends
    }

    /// Backend for an index returned by [`EdgeRouter::route`].
    pub fn backend(&self, index: usize) -> &Backend {
        &self.backends[index % self.backends.len()]
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn fallback(&self) -> Fallback {
        self.fallback
    }

    pub fn affinity(&self) -> &AffinityStore {
        &self.affinity
    }

    pub fn has_directory(&self) -> bool {
        self.directory.is_some()
    }

    pub async fn route(&self, session_id: Option<&str>) -> Route {
        let count = self.backends.len();
        match (self.policy, session_id) {
            (Policy::Sticky, Some(session_id)) => self.route_sticky(session_id).await,
            (Policy::Random, _) => Route {
                backend: Selector::random(count),
                source: RouteSource::Selected,
            },
            _ => Route {
                backend: self.selector.round_robin(count),
                source: RouteSource::Selected,
            },
        }
    }

    async fn route_sticky(&self, session_id: &str) -> Route {
        if let Some(backend) = self.affinity.get(session_id) {
            return Route {
                backend,
                source: RouteSource::Affinity,
            };
        }

        let (candidate, source) = match self.directory_owner(session_id).await {
            Some(index) => (index, RouteSource::Directory),
            None => (
                self.selector.pick(self.fallback, self.backends.len()),
                RouteSource::Pinned,
            ),
        };
        let backend = self.affinity.pin(session_id, candidate);
        debug!(
            %session_id,
            backend = %self.backends[backend],
            source = ?source,
            "Pinned session to backend"
        );
        Route { backend, source }
    }

    async fn directory_owner(&self, session_id: &str) -> Option<usize> {
        let directory = self.directory.as_ref()?;
        match directory.owner_of(session_id).await {
            Ok(Some(owner)) => {
                let index = self.backends.iter().position(|backend| {
                    backend.instance_id.as_deref() == Some(owner.instance_id.as_str())
                });
                if index.is_none() {
                    debug!(
                        %session_id,
                        instance_id = %owner.instance_id,
                        "Directory owner is not a configured backend"
                    );
                }
                index
            }
            Ok(None) => None,
            Err(e) => {
                warn!(%session_id, error = %e, "Connection directory unavailable, using fallback");
                None
            }
        }
    }
}
