// crates/core/src/directory.rs
//! Cross-instance connection directory: `registry:<sessionId>` names the
//! instance holding that session's live stream.
//!
//! The directory is a routing hint for the edge and an optional ownership
//! check for consumers. Delivery correctness never depends on it.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::error::StoreError;
use crate::identity::InstanceId;
use crate::kv::KeyValueStore;

pub const DIRECTORY_KEY_PREFIX: &str = "registry";
pub const DEFAULT_DIRECTORY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone)]
pub struct ConnectionDirectory {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl ConnectionDirectory {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn key(session_id: &str) -> String {
        format!("{DIRECTORY_KEY_PREFIX}:{session_id}")
    }

    /// Record `owner` as the holder of `session_id`, replacing any stale entry.
    pub async fn register(&self, session_id: &str, owner: &InstanceId) -> Result<(), StoreError> {
        self.store
            .set_with_ttl(&Self::key(session_id), &owner.to_string(), self.ttl)
            .await
    }

    pub async fn owner_of(&self, session_id: &str) -> Result<Option<InstanceId>, StoreError> {
        let Some(value) = self.store.get(&Self::key(session_id)).await? else {
            return Ok(None);
        };
        let owner = InstanceId::parse(&value);
        if owner.is_none() {
            warn!(%session_id, %value, "Ignoring malformed directory entry");
        }
        Ok(owner)
    }

    /// Remove the entry only if it still names `owner`. Returns whether an
    /// entry was removed.
    pub async fn unregister(&self, session_id: &str, owner: &InstanceId) -> Result<bool, StoreError> {
        self.store
            .delete_if_eq(&Self::key(session_id), &owner.to_string())
            .await
    }
}
