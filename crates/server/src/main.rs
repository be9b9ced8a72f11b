// crates/server/src/main.rs
//! Taskstream server binary.
//!
//! Connects the event bus and directory, starts the bus consumer, then
//! serves HTTP until ctrl-c. On shutdown every open stream is closed so
//! graceful shutdown is not held up by long-lived responses.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use taskstream_core::start_event_consumer;
use taskstream_observability::{init_tracing, LogFormat};
use taskstream_server::{
    create_app, init_metrics, AppState, Backends, ServerConfig, DIRECTORY_SWEEP_INTERVAL,
};

const DEFAULT_LOG_FILTER: &str = "warn,taskstream_server=info,taskstream_core=info";

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::parse();
    init_tracing(DEFAULT_LOG_FILTER, LogFormat::from_env())?;
    config.validate()?;
    init_metrics();

    let backends = Backends::connect(&config).await?;
    let state = AppState::from_config(
        &config,
        Arc::clone(&backends.bus),
        Arc::clone(&backends.store),
    );

    let shutdown = CancellationToken::new();
    let sweep = backends.spawn_directory_sweep(DIRECTORY_SWEEP_INTERVAL, shutdown.clone());
    let consumer = start_event_consumer(
        Arc::clone(&backends.bus),
        state.sessions.clone(),
        config.consumer_workers,
        shutdown.clone(),
    )
    .await
    .context("subscribing to the event bus")?;

    let app = create_app(Arc::clone(&state));
    let addr = SocketAddr::new(config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(
        %addr,
        instance_id = %state.instance,
        topic = %config.topic,
        "Taskstream server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&state), shutdown.clone()))
        .await
        .context("serving HTTP")?;

    shutdown.cancel();
    if let Err(e) = consumer.await {
        tracing::warn!(error = %e, "Event consumer ended abnormally");
    }
    if let Some(sweep) = sweep {
        let _ = sweep.await;
    }
    info!("Taskstream server stopped");
    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>, shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for ctrl-c");
        shutdown.cancelled().await;
        return;
    }
    info!("Shutdown requested");
    state.sessions.shutdown().await;
    shutdown.cancel();
}
