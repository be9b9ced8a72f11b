// crates/server/src/backends.rs
//! Choose the event bus and directory store for this process.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use taskstream_core::{EventBus, InMemoryBus, InMemoryStore, KeyValueStore};

use crate::config::ServerConfig;

const IN_MEMORY_BUS_CAPACITY: usize = 4096;
pub const DIRECTORY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct Backends {
    pub bus: Arc<dyn EventBus>,
    pub store: Arc<dyn KeyValueStore>,
    /// Set when the directory lives in this process and needs sweeping.
    local_store: Option<Arc<InMemoryStore>>,
}

impl Backends {
    /// In-process bus and directory. Only this instance can see them.
    pub fn in_memory(topic: &str) -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self {
            bus: Arc::new(InMemoryBus::new(topic, IN_MEMORY_BUS_CAPACITY)),
            store: Arc::clone(&store) as Arc<dyn KeyValueStore>,
            local_store: Some(store),
        }
    }

    /// Periodically drop expired directory entries from the in-process
    /// store. Redis expires its own keys, so this is `None` there.
    pub fn spawn_directory_sweep(
        &self,
        every: Duration,
        shutdown: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        let store = Arc::clone(self.local_store.as_ref()?);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let purged = store.purge_expired();
                        debug!(purged, remaining = store.len(), "Swept expired directory entries");
                    }
                }
            }
        }))
    }

    #[cfg(feature = "redis")]
    pub async fn connect(config: &ServerConfig) -> Result<Self> {
        use taskstream_core::{RedisBus, RedisStore};

        let Some(url) = config.redis_url.as_deref() else {
            info!("No --redis-url, running standalone with in-process bus and directory");
            return Ok(Self::in_memory(&config.topic));
        };
        let bus = RedisBus::connect(url, config.topic.clone()).await?;
        let store = RedisStore::connect(url).await?;
        info!(topic = %config.topic, "Using Redis bus and directory");
        Ok(Self {
            bus: Arc::new(bus),
            store: Arc::new(store),
            local_store: None,
        })
    }

    #[cfg(not(feature = "redis"))]
    pub async fn connect(config: &ServerConfig) -> Result<Self> {
        if config.redis_url.is_some() {
            anyhow::bail!("--redis-url needs a build with the `redis` feature");
        }
        info!("Running standalone with in-process bus and directory");
        Ok(Self::in_memory(&config.topic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[tokio::test]
    async fn test_standalone_without_redis_url() {
        let config = ServerConfig::parse_from(["taskstream", "--topic", "t1"]);
        let backends = Backends::connect(&config).await.unwrap();
        assert_eq!(backends.bus.topic(), "t1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_directory_sweep_purges_expired_entries() {
        let backends = Backends::in_memory("t1");
        backends
            .store
            .set_with_ttl("registry:old", "i1:c1", Duration::from_secs(5))
            .await
            .unwrap();
        backends
            .store
            .set_with_ttl("registry:live", "i1:c1", Duration::from_secs(600))
            .await
            .unwrap();

        let shutdown = CancellationToken::new();
        let sweep = backends
            .spawn_directory_sweep(Duration::from_secs(60), shutdown.clone())
            .expect("in-memory directory is swept");
        tokio::time::sleep(Duration::from_secs(61)).await;

        let local = backends.local_store.as_ref().unwrap();
        assert_eq!(local.len(), 1);
        assert_eq!(
            backends.store.get("registry:live").await.unwrap().as_deref(),
            Some("i1:c1")
        );

        shutdown.cancel();
        sweep.await.unwrap();
    }

    #[cfg(not(feature = "redis"))]
    #[tokio::test]
    async fn test_redis_url_needs_feature() {
        let config = ServerConfig::parse_from(["taskstream", "--redis-url", "redis://localhost"]);
        assert!(Backends::connect(&config).await.is_err());
    }
}
