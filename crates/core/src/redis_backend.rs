// crates/core/src/redis_backend.rs
//! Redis implementations of [`EventBus`] (pub/sub) and [`KeyValueStore`].

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use tracing::{info, warn};

use taskstream_types::TaskEvent;

use crate::bus::{decode, encode, EventBus, EventStream};
use crate::error::{BusError, StoreError};
use crate::kv::KeyValueStore;

/// Compare-and-delete in one round trip.
const DELETE_IF_EQ: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

async fn connect(url: &str) -> Result<(Client, ConnectionManager), redis::RedisError> {
    let client = Client::open(url)?;
    let manager = client.get_connection_manager().await?;
    Ok((client, manager))
}

pub struct RedisBus {
    client: Client,
    publisher: ConnectionManager,
    topic: String,
}

impl RedisBus {
    pub async fn connect(url: &str, topic: impl Into<String>) -> Result<Self, BusError> {
        let (client, publisher) = connect(url)
            .await
            .map_err(|e| BusError::Backend(e.to_string()))?;
        let topic = topic.into();
        info!(%topic, "Connected Redis event bus");
        Ok(Self {
            client,
            publisher,
            topic,
        })
    }
}

#[async_trait]
impl EventBus for RedisBus {
    async fn publish(&self, event: &TaskEvent) -> Result<(), BusError> {
        let payload = encode(event)?;
        let mut con = self.publisher.clone();
        con.publish::<_, _, i64>(&self.topic, payload)
            .await
            .map_err(|e| BusError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<EventStream, BusError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| BusError::Backend(e.to_string()))?;
        pubsub
            .subscribe(&self.topic)
            .await
            .map_err(|e| BusError::Backend(e.to_string()))?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            match msg.get_payload::<String>() {
                Ok(payload) => decode(&payload),
                Err(e) => {
                    warn!(error = %e, "Dropping non-text pub/sub payload");
                    None
                }
            }
        });
        Ok(stream.boxed())
    }

    fn topic(&self) -> &str {
        &self.topic
    }
}

pub struct RedisStore {
    con: ConnectionManager,
    delete_if_eq: Script,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let (_, con) = connect(url)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self {
            con,
            delete_if_eq: Script::new(DELETE_IF_EQ),
        })
    }
}

fn backend_error(op: &'static str, key: &str, e: redis::RedisError) -> StoreError {
    StoreError::Backend {
        op,
        key: key.to_string(),
        message: e.to_string(),
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut con = self.con.clone();
        con.get(key).await.map_err(|e| backend_error("GET", key, e))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut con = self.con.clone();
        con.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|e| backend_error("SETEX", key, e))
    }

    async fn delete_if_eq(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let mut con = self.con.clone();
        let removed: i64 = self
            .delete_if_eq
            .key(key)
            .arg(expected)
            .invoke_async(&mut con)
            .await
            .map_err(|e| backend_error("EVAL", key, e))?;
        Ok(removed > 0)
    }
}
