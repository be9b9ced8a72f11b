// crates/edge/src/directory.rs
use anyhow::Result;
use tracing::info;

use taskstream_core::ConnectionDirectory;

use crate::config::EdgeConfig;

/// Read-only view of the connection directory, if one is configured.
#[cfg(feature = "redis")]
pub async fn connect_directory(config: &EdgeConfig) -> Result<Option<ConnectionDirectory>> {
    use std::sync::Arc;
    use taskstream_core::{RedisStore, DEFAULT_DIRECTORY_TTL};

    let Some(url) = config.redis_url.as_deref() else {
        info!("No --redis-url, sticky routing uses local affinity only");
        return Ok(None);
    };
    let store = RedisStore::connect(url).await?;
    info!("Consulting Redis connection directory for session owners");
    Ok(Some(ConnectionDirectory::new(
        Arc::new(store),
        DEFAULT_DIRECTORY_TTL,
    )))
}

#[cfg(not(feature = "redis"))]
pub async fn connect_directory(config: &EdgeConfig) -> Result<Option<ConnectionDirectory>> {
    if config.redis_url.is_some() {
        anyhow::bail!("--redis-url needs a build with the `redis` feature");
    }
    info!("Sticky routing uses local affinity only");
    Ok(None)
}
