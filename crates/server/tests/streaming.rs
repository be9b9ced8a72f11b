//! End-to-end streaming through the HTTP surface: open a stream, submit a
//! task, read the SSE frames until the server closes the stream.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use clap::Parser;
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use taskstream_core::{start_event_consumer, EventBus, InMemoryBus, InMemoryStore, KeyValueStore};
use taskstream_server::{create_app, AppState, ServerConfig};

struct Instance {
    app: Router,
    state: Arc<AppState>,
}

async fn instance(
    name: &str,
    bus: Arc<dyn EventBus>,
    store: Arc<dyn KeyValueStore>,
    shutdown: &CancellationToken,
) -> Instance {
    let config = ServerConfig::parse_from([
        "taskstream",
        "--instance-id",
        name,
        "--subtask-min-delay-ms",
        "1",
        "--subtask-max-delay-ms",
        "5",
        "--heartbeat-initial-delay-ms",
        "600000",
    ]);
    let state = AppState::from_config(&config, Arc::clone(&bus), store);
    start_event_consumer(bus, state.sessions.clone(), 2, shutdown.clone())
        .await
        .unwrap();
    Instance {
        app: create_app(Arc::clone(&state)),
        state,
    }
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// (event name, data JSON) for every SSE frame in `body`.
fn parse_frames(body: &str) -> Vec<(String, serde_json::Value)> {
    body.split("\n\n")
        .filter(|block| !block.trim().is_empty())
        .map(|block| {
            let mut name = String::new();
            let mut data = String::new();
            for line in block.lines() {
                if let Some(v) = line.strip_prefix("event:") {
                    name = v.trim().to_string();
                } else if let Some(v) = line.strip_prefix("data:") {
                    data.push_str(v.trim());
                }
            }
            (name, serde_json::from_str(&data).unwrap())
        })
        .collect()
}

async fn read_stream(response: axum::response::Response) -> Vec<(String, serde_json::Value)> {
    let bytes = tokio::time::timeout(Duration::from_secs(5), response.into_body().collect())
        .await
        .expect("stream did not close")
        .unwrap()
        .to_bytes();
    parse_frames(std::str::from_utf8(&bytes).unwrap())
}

#[tokio::test]
async fn tracked_stream_receives_full_lifecycle_then_closes() {
    let shutdown = CancellationToken::new();
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::default());
    let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
    let node = instance("pod-a-9090", bus, store, &shutdown).await;

    let response = node
        .app
        .clone()
        .oneshot(post_json(
            "/api/events",
            r#"{"sessionId":"abc","trackedTaskIds":["abc-0","abc-1","abc-2"]}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let submit = node
        .app
        .clone()
        .oneshot(post_json(
            "/api/tasks",
            r#"{"sessionId":"abc","taskName":"fund","subtaskCount":3}"#,
        ))
        .await
        .unwrap();
    assert_eq!(submit.status(), StatusCode::ACCEPTED);

    let frames = read_stream(response).await;
    let names: Vec<&str> = frames.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "CONNECTED",
            "PROCESSING",
            "SUBTASK_COMPLETED",
            "SUBTASK_COMPLETED",
            "SUBTASK_COMPLETED",
            "COMPLETED",
            "ALL_TASKS_COMPLETED",
        ]
    );
    let ids: Vec<&str> = frames
        .iter()
        .map(|(_, d)| d["eventId"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["abc", "abc", "abc-0", "abc-1", "abc-2", "abc", "abc"]);
    assert_eq!(frames[3].1["result"], "subtask 1 result");
    assert_eq!(frames[6].1["finalEvent"], true);

    assert!(!node.state.sessions.is_open("abc"));
    shutdown.cancel();
}

#[tokio::test]
async fn legacy_stream_closes_on_first_terminal_event() {
    let shutdown = CancellationToken::new();
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::default());
    let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
    let node = instance("pod-a-9090", bus, store, &shutdown).await;

    let response = node
        .app
        .clone()
        .oneshot(Request::builder().uri("/api/events/solo").body(Body::empty()).unwrap())
        .await
        .unwrap();
    node.app
        .clone()
        .oneshot(post_json("/api/tasks", r#"{"sessionId":"solo","subtaskCount":2}"#))
        .await
        .unwrap();

    let names: Vec<String> = read_stream(response).await.into_iter().map(|(n, _)| n).collect();
    assert_eq!(
        names,
        vec![
            "CONNECTED",
            "PROCESSING",
            "SUBTASK_COMPLETED",
            "SUBTASK_COMPLETED",
            "COMPLETED",
        ]
    );
    shutdown.cancel();
}

/// The task runs on B, the stream lives on A: events cross the shared bus
/// and only A pushes them.
#[tokio::test]
async fn events_reach_the_instance_holding_the_stream() {
    let shutdown = CancellationToken::new();
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::default());
    let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
    let a = instance("pod-a-9090", Arc::clone(&bus), Arc::clone(&store), &shutdown).await;
    let b = instance("pod-b-9091", bus, Arc::clone(&store), &shutdown).await;

    let response = a
        .app
        .clone()
        .oneshot(Request::builder().uri("/api/events/cross").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(
        store.get("registry:cross").await.unwrap().as_deref(),
        Some("pod-a-9090:cluster-1")
    );

    let submit = b
        .app
        .clone()
        .oneshot(post_json("/api/tasks", r#"{"sessionId":"cross","subtaskCount":1}"#))
        .await
        .unwrap();
    assert_eq!(submit.status(), StatusCode::ACCEPTED);

    let names: Vec<String> = read_stream(response).await.into_iter().map(|(n, _)| n).collect();
    assert_eq!(
        names,
        vec!["CONNECTED", "PROCESSING", "SUBTASK_COMPLETED", "COMPLETED"]
    );
    assert_eq!(b.state.sessions.active_count(), 0);
    assert_eq!(store.get("registry:cross").await.unwrap(), None);
    shutdown.cancel();
}

#[tokio::test]
async fn failed_submission_leaves_stream_open() {
    let shutdown = CancellationToken::new();
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::default());
    let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
    let node = instance("pod-a-9090", bus, store, &shutdown).await;

    let _stream = node
        .app
        .clone()
        .oneshot(Request::builder().uri("/api/events/wait").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let rejected = node
        .app
        .clone()
        .oneshot(post_json("/api/tasks", r#"{"sessionId":"wait","subtaskCount":1000}"#))
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
    assert!(node.state.sessions.is_open("wait"));
    shutdown.cancel();
}

/// One stream follows two tasks submitted under their own session ids.
#[tokio::test]
async fn stream_completes_from_separately_submitted_tasks() {
    let shutdown = CancellationToken::new();
    let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::default());
    let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
    let node = instance("pod-a-9090", bus, store, &shutdown).await;

    let response = node
        .app
        .clone()
        .oneshot(post_json(
            "/api/events",
            r#"{"sessionId":"conn","trackedTaskIds":["conn-1","conn-2"]}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    for body in [
        r#"{"sessionId":"conn-1","subtaskCount":1}"#,
        r#"{"sessionId":"conn-2","subtaskCount":2}"#,
    ] {
        let submit = node
            .app
            .clone()
            .oneshot(post_json("/api/tasks", body))
            .await
            .unwrap();
        assert_eq!(submit.status(), StatusCode::ACCEPTED);
    }

    let frames = read_stream(response).await;
    assert_eq!(frames.first().map(|(n, _)| n.as_str()), Some("CONNECTED"));
    let (last_name, last_data) = frames.last().unwrap();
    assert_eq!(last_name, "ALL_TASKS_COMPLETED");
    assert_eq!(last_data["eventId"], "conn");
    assert_eq!(last_data["finalEvent"], true);

    let count = |name: &str| frames.iter().filter(|(n, _)| n == name).count();
    assert_eq!(count("PROCESSING"), 2);
    assert_eq!(count("SUBTASK_COMPLETED"), 3);
    let mut completed: Vec<&str> = frames
        .iter()
        .filter(|(n, _)| n == "COMPLETED")
        .map(|(_, d)| d["eventId"].as_str().unwrap())
        .collect();
    completed.sort_unstable();
    assert_eq!(completed, vec!["conn-1", "conn-2"]);

    assert!(!node.state.sessions.is_open("conn"));
    shutdown.cancel();
}
