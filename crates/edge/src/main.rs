// crates/edge/src/main.rs
use std::net::SocketAddr;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use taskstream_edge::{
    app, directory::connect_directory, router::EdgeRouter, EdgeConfig, EdgeState,
};
use taskstream_observability::{init_tracing, LogFormat};

const DEFAULT_LOG_FILTER: &str = "warn,taskstream_edge=info";

#[tokio::main]
async fn main() -> Result<()> {
    let config = EdgeConfig::parse();
    init_tracing(DEFAULT_LOG_FILTER, LogFormat::from_env())?;
    config.validate()?;

    let directory = connect_directory(&config).await?;
    let router = EdgeRouter::new(
        config.backends.clone(),
        config.policy,
        config.sticky_fallback,
        config.affinity_store(),
        directory,
    )?;
    for backend in router.backends() {
        info!(
            backend = %backend,
            instance_id = backend.instance_id.as_deref().unwrap_or("-"),
            weight = backend.weight,
            "Backend configured"
        );
    }

    let state = EdgeState::new(router, config.max_body_bytes);
    let app = app(state);

    let addr = SocketAddr::new(config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(policy = config.policy.as_str(), "Edge router listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Edge router stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
