// crates/core/src/consumer.rs
//! Bus consumer: feeds every event on the topic to the local session
//! manager.
//!
//! Events are sharded over a small worker pool by session id, so one slow
//! client only stalls its own shard and per-session order is preserved.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use taskstream_types::TaskEvent;

use crate::bus::{EventBus, EventStream};
use crate::error::BusError;
use crate::session::SessionManager;

const SHARD_QUEUE_DEPTH: usize = 256;
const MAX_RESUBSCRIBE_DELAY: Duration = Duration::from_secs(30);

/// Subscribe now, then consume in the background until `shutdown` fires.
///
/// The first subscription is made before returning, so events published
/// after this call resolves are seen. If the subscription ends it is
/// re-established with exponential backoff.
pub async fn start_event_consumer(
    bus: Arc<dyn EventBus>,
    sessions: SessionManager,
    workers: usize,
    shutdown: CancellationToken,
) -> Result<JoinHandle<()>, BusError> {
    let stream = bus.subscribe().await?;
    info!(topic = bus.topic(), workers, "Event consumer subscribed");

    let shards: Vec<mpsc::Sender<TaskEvent>> = (0..workers.max(1))
        .map(|_| spawn_shard(sessions.clone()))
        .collect();

    Ok(tokio::spawn(consume(bus, stream, shards, shutdown)))
}

fn spawn_shard(sessions: SessionManager) -> mpsc::Sender<TaskEvent> {
    let (tx, mut rx) = mpsc::channel::<TaskEvent>(SHARD_QUEUE_DEPTH);
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            sessions.on_bus_event(event).await;
        }
    });
    tx
}

pub(crate) fn shard_for(session_id: &str, shards: usize) -> usize {
    crc32fast::hash(session_id.as_bytes()) as usize % shards.max(1)
}

async fn consume(
    bus: Arc<dyn EventBus>,
    mut stream: EventStream,
    shards: Vec<mpsc::Sender<TaskEvent>>,
    shutdown: CancellationToken,
) {
    let mut backoff = Duration::from_secs(1);
    loop {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Event consumer stopped");
                    return;
                }
                next = stream.next() => next,
            };
            let Some(event) = event else { break };
            backoff = Duration::from_secs(1);

            let shard = shard_for(&event.address().session_id, shards.len());
            if shards[shard].send(event).await.is_err() {
                warn!(shard, "Consumer shard is gone, dropping event");
            }
        }

        warn!(topic = bus.topic(), "Event subscription ended, resubscribing");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(backoff) => {}
            }
            match bus.subscribe().await {
                Ok(next) => {
                    debug!(topic = bus.topic(), "Resubscribed");
                    stream = next;
                    break;
                }
                Err(e) => {
                    warn!(backoff_secs = backoff.as_secs(), error = %e, "Resubscribe failed");
                    backoff = (backoff * 2).min(MAX_RESUBSCRIBE_DELAY);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use crate::directory::{ConnectionDirectory, DEFAULT_DIRECTORY_TTL};
    use crate::identity::InstanceId;
    use crate::kv::InMemoryStore;
    use crate::session::SessionConfig;
    use pretty_assertions::assert_eq;
    use taskstream_types::{EventAddress, EventStatus};

    fn quiet() -> SessionConfig {
        SessionConfig {
            heartbeat_initial_delay: Duration::from_secs(3600),
            heartbeat_interval: Duration::from_secs(3600),
            max_lifetime: None,
            ..SessionConfig::default()
        }
    }

    #[test]
    fn test_shard_is_stable() {
        assert_eq!(shard_for("abc", 4), shard_for("abc", 4));
        assert!(shard_for("abc", 4) < 4);
        assert_eq!(shard_for("abc", 0), 0);
    }

    /// Two instances share a bus and a directory; only the owner delivers.
    #[tokio::test]
    async fn test_only_owning_instance_delivers() {
        let bus = Arc::new(InMemoryBus::default());
        let directory = ConnectionDirectory::new(Arc::new(InMemoryStore::new()), DEFAULT_DIRECTORY_TTL);
        let a = SessionManager::new(InstanceId::new("a", "c1"), directory.clone(), quiet());
        let b = SessionManager::new(InstanceId::new("b", "c1"), directory.clone(), quiet());
        let shutdown = CancellationToken::new();

        start_event_consumer(bus.clone(), a.clone(), 2, shutdown.clone())
            .await
            .unwrap();
        start_event_consumer(bus.clone(), b.clone(), 2, shutdown.clone())
            .await
            .unwrap();

        let mut stream = b.open("owned-by-b", None).await.unwrap();
        assert_eq!(directory.owner_of("owned-by-b").await.unwrap(), Some(b.instance().clone()));

        for i in 0..3 {
            let event = TaskEvent::new(
                EventAddress::subtask("owned-by-b", i),
                EventStatus::SubtaskCompleted,
                "done",
            );
            bus.publish(&event).await.unwrap();
        }
        let done = TaskEvent::new(EventAddress::session("owned-by-b"), EventStatus::Completed, "ok")
            .terminal();
        bus.publish(&done).await.unwrap();

        let mut seen = Vec::new();
        while let Some(event) = tokio::time::timeout(Duration::from_secs(2), stream.recv())
            .await
            .unwrap()
        {
            seen.push(event.event_id);
        }
        assert_eq!(
            seen,
            vec!["owned-by-b", "owned-by-b-0", "owned-by-b-1", "owned-by-b-2", "owned-by-b"]
        );
        assert!(!a.is_open("owned-by-b"));
        shutdown.cancel();
    }
}
