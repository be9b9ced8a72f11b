// crates/core/src/session/manager.rs
//! Session lifecycle: open, deliver bus events, heartbeat, close.
//!
//! Lock discipline: each session has one writer mutex guarding its sender
//! and completion state. Directory calls are remote and are never made
//! while that mutex is held.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use taskstream_types::{parent_stream_id, validate_session_id, TaskEvent};

use super::store::{tracked_ids, PushError, SessionStore, StreamSession};
use super::stream::SessionStream;
use super::tracker::Completion;
use super::{CloseReason, Delivery, SessionConfig};
use crate::directory::ConnectionDirectory;
use crate::error::SessionError;
use crate::identity::InstanceId;

const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(10);

enum Pushed {
    Delivered,
    Finished,
    Failed,
    Closed,
}

/// Owns every live stream on this instance. Cheap to clone.
#[derive(Clone)]
pub struct SessionManager {
    instance: Arc<InstanceId>,
    store: Arc<SessionStore>,
    directory: ConnectionDirectory,
    config: Arc<SessionConfig>,
    next_generation: Arc<AtomicU64>,
}

impl SessionManager {
    pub fn new(instance: InstanceId, directory: ConnectionDirectory, config: SessionConfig) -> Self {
        Self {
            instance: Arc::new(instance),
            store: Arc::new(SessionStore::new()),
            directory,
            config: Arc::new(config),
            next_generation: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn instance(&self) -> &InstanceId {
        &self.instance
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn active_count(&self) -> usize {
        self.store.len()
    }

    pub fn is_open(&self, session_id: &str) -> bool {
        self.store.get(session_id).is_some()
    }

    /// Open a stream for `session_id`. `CONNECTED` is already queued on the
    /// returned stream. An existing local session with the same id is
    /// closed as `replaced`.
    pub async fn open(
        &self,
        session_id: &str,
        tracked: Option<Vec<String>>,
    ) -> Result<SessionStream, SessionError> {
        validate_session_id(session_id)?;

        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        if tx.try_send(TaskEvent::connected(session_id)).is_err() {
            return Err(SessionError::InitialSend {
                session_id: session_id.to_string(),
            });
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let tracked = tracked_ids(tracked);
        let tracked_count = tracked.len();
        let session = Arc::new(StreamSession::new(
            session_id.to_string(),
            generation,
            tracked,
            tx,
        ));

        if let Some(previous) = self.store.insert(Arc::clone(&session)) {
            info!(%session_id, old_generation = previous.generation, "Replacing open session");
            self.teardown(previous, CloseReason::Replaced).await;
        }

        if let Err(e) = self.directory.register(session_id, &self.instance).await {
            warn!(%session_id, error = %e, "Failed to register session in directory");
        }

        self.spawn_heartbeat(session);

        counter!("taskstream_sessions_opened_total").increment(1);
        gauge!("taskstream_sessions_active").set(self.store.len() as f64);
        info!(
            %session_id,
            generation,
            tracked = tracked_count,
            instance_id = %self.instance,
            "Session opened"
        );

        Ok(SessionStream::new(
            session_id.to_string(),
            generation,
            rx,
            self.clone(),
        ))
    }

    /// Route one bus event. Events for sessions not held here are a no-op.
    ///
    /// An event reaches the session it is addressed to and, when that id is
    /// a task tracked by a parent stream (`conn-A` under `conn`), that
    /// parent stream as well.
    pub async fn on_bus_event(&self, event: TaskEvent) -> Delivery {
        let address = event.address();
        let direct = self.store.get(&address.session_id);
        let parent = parent_stream_id(&address.session_id)
            .and_then(|id| self.store.get(id))
            .filter(|session| session.tracks_task(&address.session_id));

        match (direct, parent) {
            (None, None) => {
                trace!(event_id = %event.event_id, "No local session for event");
                Delivery::NotLocal
            }
            (Some(session), None) | (None, Some(session)) => self.deliver(session, event).await,
            (Some(direct), Some(parent)) => {
                let delivery = self.deliver(direct, event.clone()).await;
                self.deliver(parent, event).await;
                delivery
            }
        }
    }

    async fn deliver(&self, session: Arc<StreamSession>, event: TaskEvent) -> Delivery {
        if self.config.verify_ownership {
            match self.directory.owner_of(&session.session_id).await {
                Ok(Some(owner)) if owner != *self.instance => {
                    warn!(
                        session_id = %session.session_id,
                        owner = %owner,
                        "Directory names another owner, closing local session"
                    );
                    self.close_generation(&session.session_id, session.generation, CloseReason::Replaced)
                        .await;
                    return Delivery::NotOwner;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(session_id = %session.session_id, error = %e, "Ownership check failed, delivering");
                }
            }
        }

        let status = event.status;
        let event_id = event.event_id.clone();
        let pushed = {
            let mut writer = session.writer.lock().await;
            let completion = writer.tracker.observe(&event);
            match writer.push(event, self.config.send_timeout).await {
                Err(PushError::Closed) => Pushed::Closed,
                Err(PushError::Failed) => Pushed::Failed,
                Ok(()) => match completion {
                    Completion::Open => Pushed::Delivered,
                    Completion::SessionEnded => {
                        writer.release();
                        Pushed::Finished
                    }
                    Completion::AllTracked => {
                        let done = TaskEvent::all_tasks_completed(&session.session_id);
                        if writer.push(done, self.config.send_timeout).await.is_err() {
                            warn!(session_id = %session.session_id, "Failed to send ALL_TASKS_COMPLETED");
                        }
                        writer.release();
                        Pushed::Finished
                    }
                },
            }
        };

        match pushed {
            Pushed::Closed => Delivery::NotLocal,
            Pushed::Delivered => {
                counter!("taskstream_events_delivered_total", "status" => status.as_str()).increment(1);
                debug!(session_id = %session.session_id, %event_id, %status, "Event delivered");
                Delivery::Delivered
            }
            Pushed::Finished => {
                counter!("taskstream_events_delivered_total", "status" => status.as_str()).increment(1);
                self.close_generation(&session.session_id, session.generation, CloseReason::Completed)
                    .await;
                Delivery::Finished
            }
            Pushed::Failed => {
                warn!(session_id = %session.session_id, %event_id, "Push to client failed");
                self.close_generation(
                    &session.session_id,
                    session.generation,
                    CloseReason::DeliveryFailed,
                )
                .await;
                Delivery::Failed
            }
        }
    }

    /// Close whatever session is open under `session_id`. Idempotent:
    /// returns false if nothing was open.
    pub async fn close(&self, session_id: &str, reason: CloseReason) -> bool {
        match self.store.remove(session_id) {
            Some(session) => {
                self.teardown(session, reason).await;
                true
            }
            None => false,
        }
    }

    /// Close `session_id` only if it is still the given generation.
    pub async fn close_generation(&self, session_id: &str, generation: u64, reason: CloseReason) -> bool {
        match self.store.remove_generation(session_id, generation) {
            Some(session) => {
                self.teardown(session, reason).await;
                true
            }
            None => false,
        }
    }

    /// Close every local session. Returns how many were closed.
    pub async fn shutdown(&self) -> usize {
        let mut closed = 0;
        for session_id in self.store.ids() {
            if self.close(&session_id, CloseReason::Shutdown).await {
                closed += 1;
            }
        }
        info!(closed, "All sessions closed for shutdown");
        closed
    }

    async fn teardown(&self, session: Arc<StreamSession>, reason: CloseReason) {
        session.heartbeat.cancel();
        session.writer.lock().await.release();

        self.release_directory_entry(&session.session_id).await;

        counter!("taskstream_sessions_closed_total", "reason" => reason.as_str()).increment(1);
        gauge!("taskstream_sessions_active").set(self.store.len() as f64);
        info!(
            session_id = %session.session_id,
            generation = session.generation,
            %reason,
            lifetime_ms = session.opened_at.elapsed().as_millis() as u64,
            "Session closed"
        );
    }

    /// Drop this instance's directory entry for a closed session. A newer
    /// session under the same id keeps the entry, including one that
    /// registered while the delete was in flight.
    async fn release_directory_entry(&self, session_id: &str) {
        if self.store.get(session_id).is_some() {
            return;
        }
        if let Err(e) = self.directory.unregister(session_id, &self.instance).await {
            warn!(%session_id, error = %e, "Failed to unregister session");
            return;
        }
        if self.store.get(session_id).is_some() {
            debug!(%session_id, "Session reopened during close, restoring directory entry");
            if let Err(e) = self.directory.register(session_id, &self.instance).await {
                warn!(%session_id, error = %e, "Failed to restore directory entry");
            }
        }
    }

    fn spawn_heartbeat(&self, session: Arc<StreamSession>) {
        let manager = self.clone();
        let token = session.heartbeat.clone();
        let first = Instant::now() + self.config.heartbeat_initial_delay;
        let period = self.config.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL);
        let deadline = self.config.max_lifetime.map(|d| session.opened_at + d);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let expired = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };
            tokio::pin!(expired);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = &mut expired => {
                        manager
                            .close_generation(&session.session_id, session.generation, CloseReason::Timeout)
                            .await;
                        break;
                    }
                    _ = ticker.tick() => {}
                }
                if !manager.beat(&session).await {
                    break;
                }
            }
            trace!(session_id = %session.session_id, "Heartbeat stopped");
        });
    }

    /// Push one heartbeat. Returns false when the heartbeat should stop.
    async fn beat(&self, session: &StreamSession) -> bool {
        if !self.store.is_current(&session.session_id, session.generation) {
            return false;
        }
        let pushed = {
            let mut writer = session.writer.lock().await;
            // A close may have started while this beat waited for the lock.
            if !self.store.is_current(&session.session_id, session.generation) {
                return false;
            }
            writer
                .push(TaskEvent::heartbeat(&session.session_id), self.config.send_timeout)
                .await
        };
        match pushed {
            Ok(()) => {
                trace!(session_id = %session.session_id, "Heartbeat sent");
                true
            }
            Err(PushError::Closed) => false,
            Err(PushError::Failed) => {
                warn!(session_id = %session.session_id, "Heartbeat push failed");
                self.close_generation(
                    &session.session_id,
                    session.generation,
                    CloseReason::DeliveryFailed,
                )
                .await;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::DEFAULT_DIRECTORY_TTL;
    use crate::kv::InMemoryStore;
    use pretty_assertions::assert_eq;
    use taskstream_types::{EventAddress, EventStatus};

    fn manager_with(config: SessionConfig) -> (SessionManager, ConnectionDirectory) {
        let directory = ConnectionDirectory::new(Arc::new(InMemoryStore::new()), DEFAULT_DIRECTORY_TTL);
        let manager = SessionManager::new(
            InstanceId::new("pod-test-9090", "cluster-1"),
            directory.clone(),
            config,
        );
        (manager, directory)
    }

    fn quiet_config() -> SessionConfig {
        SessionConfig {
            heartbeat_initial_delay: Duration::from_secs(3600),
            heartbeat_interval: Duration::from_secs(3600),
            max_lifetime: None,
            ..SessionConfig::default()
        }
    }

    fn subtask(session: &str, i: u32) -> TaskEvent {
        TaskEvent::new(EventAddress::subtask(session, i), EventStatus::SubtaskCompleted, "done")
    }

    fn session_event(session: &str, status: EventStatus) -> TaskEvent {
        TaskEvent::new(EventAddress::session(session), status, status.as_str())
    }

    async fn drain(stream: &mut SessionStream) -> Vec<EventStatus> {
        let mut out = Vec::new();
        while let Some(event) = stream.recv().await {
            out.push(event.status);
        }
        out
    }

    #[tokio::test]
    async fn test_open_sends_connected_and_registers() {
        let (manager, directory) = manager_with(quiet_config());
        let mut stream = manager.open("abc", None).await.unwrap();

        let first = stream.recv().await.unwrap();
        assert_eq!(first.status, EventStatus::Connected);
        assert_eq!(first.event_id, "abc");
        assert_eq!(
            directory.owner_of("abc").await.unwrap(),
            Some(manager.instance().clone())
        );
        assert_eq!(manager.active_count(), 1);
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_id() {
        let (manager, _) = manager_with(quiet_config());
        assert!(matches!(
            manager.open("bad id", None).await,
            Err(SessionError::Invalid(_))
        ));
        assert_eq!(manager.active_count(), 0);
    }

    #[tokio::test]
    async fn test_event_for_unknown_session_is_noop() {
        let (manager, _) = manager_with(quiet_config());
        let delivery = manager.on_bus_event(subtask("nobody", 0)).await;
        assert_eq!(delivery, Delivery::NotLocal);
    }

    #[tokio::test]
    async fn test_legacy_mode_first_terminal_closes() {
        let (manager, directory) = manager_with(quiet_config());
        let mut stream = manager.open("s1", None).await.unwrap();

        assert_eq!(
            manager.on_bus_event(session_event("s1", EventStatus::Processing)).await,
            Delivery::Delivered
        );
        assert_eq!(
            manager.on_bus_event(subtask("s1", 0)).await,
            Delivery::Delivered
        );
        assert_eq!(
            manager
                .on_bus_event(session_event("s1", EventStatus::Completed).terminal())
                .await,
            Delivery::Finished
        );
        // Anything after the close is not delivered.
        assert_eq!(
            manager.on_bus_event(subtask("s1", 1)).await,
            Delivery::NotLocal
        );

        assert_eq!(
            drain(&mut stream).await,
            vec![
                EventStatus::Connected,
                EventStatus::Processing,
                EventStatus::SubtaskCompleted,
                EventStatus::Completed,
            ]
        );
        assert!(!manager.is_open("s1"));
        assert_eq!(directory.owner_of("s1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_tracked_ids_close_with_all_tasks_completed() {
        let (manager, _) = manager_with(quiet_config());
        let tracked = vec!["t-0".to_string(), "t-1".to_string(), "t-2".to_string()];
        let mut stream = manager.open("t", Some(tracked)).await.unwrap();

        for i in [2, 0] {
            assert_eq!(
                manager.on_bus_event(subtask("t", i).terminal()).await,
                Delivery::Delivered
            );
        }
        assert!(manager.is_open("t"));
        assert_eq!(
            manager.on_bus_event(subtask("t", 1).terminal()).await,
            Delivery::Finished
        );

        assert_eq!(
            drain(&mut stream).await,
            vec![
                EventStatus::Connected,
                EventStatus::SubtaskCompleted,
                EventStatus::SubtaskCompleted,
                EventStatus::SubtaskCompleted,
                EventStatus::AllTasksCompleted,
            ]
        );
    }

    #[tokio::test]
    async fn test_tracked_task_events_reach_parent_stream() {
        let (manager, _) = manager_with(quiet_config());
        let tracked = vec!["conn-1".to_string(), "conn-2".to_string()];
        let mut stream = manager.open("conn", Some(tracked)).await.unwrap();

        assert_eq!(
            manager.on_bus_event(session_event("conn-2", EventStatus::Processing)).await,
            Delivery::Delivered
        );
        assert_eq!(
            manager.on_bus_event(subtask("conn-2", 0)).await,
            Delivery::Delivered
        );
        assert_eq!(
            manager
                .on_bus_event(session_event("conn-2", EventStatus::Completed).terminal())
                .await,
            Delivery::Delivered
        );
        assert!(manager.is_open("conn"));
        assert_eq!(
            manager
                .on_bus_event(session_event("conn-1", EventStatus::Completed).terminal())
                .await,
            Delivery::Finished
        );

        assert_eq!(
            drain(&mut stream).await,
            vec![
                EventStatus::Connected,
                EventStatus::Processing,
                EventStatus::SubtaskCompleted,
                EventStatus::Completed,
                EventStatus::Completed,
                EventStatus::AllTasksCompleted,
            ]
        );
    }

    #[tokio::test]
    async fn test_untracked_child_task_skips_parent_stream() {
        let (manager, _) = manager_with(quiet_config());
        let _legacy = manager.open("conn", None).await.unwrap();
        let _tracking = manager
            .open("other", Some(vec!["other-1".to_string()]))
            .await
            .unwrap();

        assert_eq!(
            manager
                .on_bus_event(session_event("conn-1", EventStatus::Completed).terminal())
                .await,
            Delivery::NotLocal
        );
        assert_eq!(
            manager
                .on_bus_event(session_event("other-9", EventStatus::Completed).terminal())
                .await,
            Delivery::NotLocal
        );
        assert!(manager.is_open("conn"));
        assert!(manager.is_open("other"));
    }

    #[tokio::test]
    async fn test_task_stream_and_parent_stream_both_receive() {
        let (manager, _) = manager_with(quiet_config());
        let mut own = manager.open("conn-1", None).await.unwrap();
        let mut parent = manager
            .open("conn", Some(vec!["conn-1".to_string()]))
            .await
            .unwrap();

        let delivery = manager
            .on_bus_event(session_event("conn-1", EventStatus::Completed).terminal())
            .await;
        assert_eq!(delivery, Delivery::Finished);

        assert_eq!(
            drain(&mut own).await,
            vec![EventStatus::Connected, EventStatus::Completed]
        );
        assert_eq!(
            drain(&mut parent).await,
            vec![
                EventStatus::Connected,
                EventStatus::Completed,
                EventStatus::AllTasksCompleted,
            ]
        );
    }

    #[tokio::test]
    async fn test_foreign_owner_closes_local_session() {
        let config = SessionConfig {
            verify_ownership: true,
            ..quiet_config()
        };
        let (manager, directory) = manager_with(config);
        let mut stream = manager.open("moved", None).await.unwrap();
        let elsewhere = InstanceId::new("pod-other-9091", "cluster-1");
        directory.register("moved", &elsewhere).await.unwrap();

        assert_eq!(
            manager.on_bus_event(subtask("moved", 0)).await,
            Delivery::NotOwner
        );
        assert!(!manager.is_open("moved"));
        assert_eq!(drain(&mut stream).await, vec![EventStatus::Connected]);
        // The other instance's entry is left alone.
        assert_eq!(directory.owner_of("moved").await.unwrap(), Some(elsewhere));
    }

    #[tokio::test]
    async fn test_stale_close_keeps_reopened_session_registered() {
        let (manager, directory) = manager_with(quiet_config());
        let _first = manager.open("s", None).await.unwrap();
        let old = manager.store().get("s").unwrap();

        // An in-flight push holds the writer while the close starts.
        let writer = old.writer.lock().await;
        let closer = tokio::spawn({
            let manager = manager.clone();
            async move { manager.close("s", CloseReason::ClientDisconnected).await }
        });
        while manager.is_open("s") {
            tokio::task::yield_now().await;
        }

        let mut second = manager.open("s", None).await.unwrap();
        drop(writer);
        assert!(closer.await.unwrap());

        assert!(manager.is_open("s"));
        assert_eq!(
            directory.owner_of("s").await.unwrap(),
            Some(manager.instance().clone())
        );
        manager.on_bus_event(subtask("s", 0)).await;
        assert_eq!(second.recv().await.unwrap().status, EventStatus::Connected);
        assert_eq!(second.recv().await.unwrap().status, EventStatus::SubtaskCompleted);
    }

    #[tokio::test]
    async fn test_dropped_stream_closes_session() {
        let (manager, directory) = manager_with(quiet_config());
        let stream = manager.open("gone", None).await.unwrap();
        drop(stream);

        for _ in 0..50 {
            if !manager.is_open("gone") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!manager.is_open("gone"));
        assert_eq!(directory.owner_of("gone").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_full_channel_fails_delivery() {
        let config = SessionConfig {
            channel_capacity: 1,
            send_timeout: Duration::from_millis(10),
            ..quiet_config()
        };
        let (manager, directory) = manager_with(config);
        // CONNECTED occupies the only slot and is never read.
        let _stream = manager.open("slow", None).await.unwrap();

        assert_eq!(manager.on_bus_event(subtask("slow", 0)).await, Delivery::Failed);
        assert!(!manager.is_open("slow"));
        assert_eq!(directory.owner_of("slow").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reopen_replaces_old_session() {
        let (manager, directory) = manager_with(quiet_config());
        let mut first = manager.open("dup", None).await.unwrap();
        let mut second = manager.open("dup", None).await.unwrap();

        assert_eq!(drain(&mut first).await, vec![EventStatus::Connected]);
        drop(first);

        manager.on_bus_event(subtask("dup", 0)).await;
        assert_eq!(second.recv().await.unwrap().status, EventStatus::Connected);
        assert_eq!(second.recv().await.unwrap().status, EventStatus::SubtaskCompleted);

        tokio::task::yield_now().await;
        assert!(manager.is_open("dup"));
        assert_eq!(
            directory.owner_of("dup").await.unwrap(),
            Some(manager.instance().clone())
        );
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (manager, _) = manager_with(quiet_config());
        let _stream = manager.open("c", None).await.unwrap();
        assert!(manager.close("c", CloseReason::Shutdown).await);
        assert!(!manager.close("c", CloseReason::Shutdown).await);
    }

    #[tokio::test]
    async fn test_shutdown_closes_everything() {
        let (manager, _) = manager_with(quiet_config());
        let mut a = manager.open("a", None).await.unwrap();
        let mut b = manager.open("b", None).await.unwrap();

        assert_eq!(manager.shutdown().await, 2);
        assert_eq!(manager.active_count(), 0);
        assert_eq!(drain(&mut a).await, vec![EventStatus::Connected]);
        assert_eq!(drain(&mut b).await, vec![EventStatus::Connected]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeats_start_after_initial_delay() {
        let config = SessionConfig {
            heartbeat_initial_delay: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(10),
            max_lifetime: None,
            ..SessionConfig::default()
        };
        let (manager, _) = manager_with(config);
        let opened = Instant::now();
        let mut stream = manager.open("hb", None).await.unwrap();

        assert_eq!(stream.recv().await.unwrap().status, EventStatus::Connected);

        let beat = stream.recv().await.unwrap();
        assert_eq!(beat.status, EventStatus::Heartbeat);
        assert!(opened.elapsed() >= Duration::from_secs(2));

        let beat = stream.recv().await.unwrap();
        assert_eq!(beat.status, EventStatus::Heartbeat);
        assert!(opened.elapsed() >= Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_heartbeat_after_close() {
        let config = SessionConfig {
            heartbeat_initial_delay: Duration::from_millis(100),
            heartbeat_interval: Duration::from_millis(100),
            max_lifetime: None,
            ..SessionConfig::default()
        };
        let (manager, _) = manager_with(config);
        let mut stream = manager.open("hb", None).await.unwrap();
        assert_eq!(stream.recv().await.unwrap().status, EventStatus::Connected);

        assert_eq!(stream.recv().await.unwrap().status, EventStatus::Heartbeat);
        manager.close("hb", CloseReason::Completed).await;

        tokio::time::advance(Duration::from_secs(5)).await;
        // The stream ends; no heartbeat arrives after close.
        assert_eq!(stream.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_waiting_on_writer_is_dropped_by_close() {
        let config = SessionConfig {
            heartbeat_initial_delay: Duration::from_millis(100),
            heartbeat_interval: Duration::from_secs(3600),
            max_lifetime: None,
            ..SessionConfig::default()
        };
        let (manager, _) = manager_with(config);
        let mut stream = manager.open("race", None).await.unwrap();
        let session = manager.store().get("race").unwrap();

        // Park the first heartbeat on the writer lock.
        let writer = session.writer.lock().await;
        tokio::time::advance(Duration::from_millis(150)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let closer = tokio::spawn({
            let manager = manager.clone();
            async move { manager.close("race", CloseReason::Completed).await }
        });
        while manager.is_open("race") {
            tokio::task::yield_now().await;
        }
        drop(writer);
        assert!(closer.await.unwrap());

        assert_eq!(drain(&mut stream).await, vec![EventStatus::Connected]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_lifetime_closes_session() {
        let config = SessionConfig {
            heartbeat_initial_delay: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(10),
            max_lifetime: Some(Duration::from_secs(15)),
            ..SessionConfig::default()
        };
        let (manager, _) = manager_with(config);
        let mut stream = manager.open("old", None).await.unwrap();

        assert_eq!(
            drain(&mut stream).await,
            vec![
                EventStatus::Connected,
                EventStatus::Heartbeat,
                EventStatus::Heartbeat,
            ]
        );
        assert!(!manager.is_open("old"));
    }
}
