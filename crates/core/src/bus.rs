// crates/core/src/bus.rs
//! Topic-based publish/subscribe for task events.
//!
//! Every instance subscribes to the same topic and sees every event; the
//! session manager decides locally whether an event is for one of its
//! connections. Delivery is at-least-once at best: a publish that fails is
//! reported to the caller, never retried here.

use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use taskstream_types::TaskEvent;

use crate::error::BusError;

/// Default topic for task lifecycle events.
pub const DEFAULT_TOPIC: &str = "task-events";

/// Stream of decoded events from one subscription.
pub type EventStream = BoxStream<'static, TaskEvent>;

#[async_trait]
pub trait EventBus: Send + Sync + 'static {
    /// Publish one event. The message key is the event id.
    async fn publish(&self, event: &TaskEvent) -> Result<(), BusError>;

    /// Open a new subscription to the topic. Events published before this
    /// call returns are not replayed.
    async fn subscribe(&self) -> Result<EventStream, BusError>;

    fn topic(&self) -> &str;
}

/// Serialize an event to its wire form.
pub fn encode(event: &TaskEvent) -> Result<String, BusError> {
    serde_json::to_string(event).map_err(|source| BusError::Encode {
        event_id: event.event_id.clone(),
        source,
    })
}

/// Decode a wire payload. Undecodable payloads are logged and dropped.
pub fn decode(payload: &str) -> Option<TaskEvent> {
    match serde_json::from_str(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, payload_len = payload.len(), "Dropping undecodable bus message");
            None
        }
    }
}

/// In-process bus backed by a tokio broadcast channel.
///
/// Payloads are carried in their JSON wire form so the in-process path
/// exercises the same encoding as a networked bus. Cloning shares the
/// channel, which is how several instances in one process form a fleet.
#[derive(Clone)]
pub struct InMemoryBus {
    topic: String,
    tx: broadcast::Sender<String>,
}

impl InMemoryBus {
    pub fn new(topic: impl Into<String>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            topic: topic.into(),
            tx,
        }
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC, 1024)
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, event: &TaskEvent) -> Result<(), BusError> {
        let payload = encode(event)?;
        // No subscribers is not a failure: nobody is streaming yet.
        if self.tx.send(payload).is_err() {
            debug!(topic = %self.topic, event_id = %event.event_id, "Published with no subscribers");
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<EventStream, BusError> {
        let topic = self.topic.clone();
        let stream = BroadcastStream::new(self.tx.subscribe()).filter_map(move |item| {
            let topic = topic.clone();
            async move {
                match item {
                    Ok(payload) => decode(&payload),
                    Err(BroadcastStreamRecvError::Lagged(n)) => {
                        warn!(%topic, skipped = n, "Bus subscriber lagged, events dropped");
                        None
                    }
                }
            }
        });
        Ok(stream.boxed())
    }

    fn topic(&self) -> &str {
        &self.topic
    }
}
