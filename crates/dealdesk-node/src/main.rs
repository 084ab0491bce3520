use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dealdesk_node::{AppState, Args, LogSink, Node, router, telemetry};
use dealdesk_types::{EngineConfig, SystemClock};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    telemetry::init(args.json_logs)?;

    let config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => {
            tracing::warn!("No config file given, using defaults");
            EngineConfig::default()
        }
    };
    config.validate().context("validating config")?;

    let node = Node::build(&config, Arc::new(SystemClock), Arc::new(LogSink))
        .context("assembling node")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(dealdesk_sweeper::run(
        Arc::clone(&node.sweeper),
        config.sweeper.interval(),
        shutdown_rx,
    ));

    let app = router(AppState::new(Arc::clone(&node.reconciler)));
    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;
    tracing::info!(address = %args.listen, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped, stopping sweeper");
    // The sweeper exits on a dropped sender too, so a send error is fine.
    let _ = shutdown_tx.send(true);
    let sweeps = sweeper.await?;
    tracing::info!(sweeps, "Node shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
