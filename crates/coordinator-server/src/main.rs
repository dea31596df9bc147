//! job-coordinator — coordination server for GPU-based key-recovery
//! jobs (§1). Reads configuration from the environment (§4.12),
//! serves the JSON API in §6, and runs the background liveness
//! sweeper (§4.11) alongside it.

mod auth;
mod cli;
mod dto;
mod error;
mod handlers;
mod ip;
mod router;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use coordinator_engine::Coordinator;
use coordinator_model::config::Config;

use crate::cli::Cli;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&cli.log_filter))
        .init();

    let mut config = Config::from_env();
    if let Some(host) = &cli.host {
        config.bind_addr = format!("{host}:{}", config.bind_addr.rsplit(':').next().unwrap_or("7799"));
    }
    if let Some(port) = cli.port {
        let host = config.bind_addr.rsplit_once(':').map(|(h, _)| h).unwrap_or("127.0.0.1").to_string();
        config.bind_addr = format!("{host}:{port}");
    }

    let bind_addr: SocketAddr = config.bind_addr.parse()?;
    let sweep_interval = config.sweep_interval.to_std().unwrap_or(std::time::Duration::from_secs(60));

    let coordinator = Arc::new(Coordinator::new(config));
    spawn_sweeper(Arc::clone(&coordinator), sweep_interval);

    let app = router::build_router(AppState { coordinator });

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(%bind_addr, "job-coordinator listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// §4.11: runs the two liveness sweeps on a fixed interval so jobs and
/// stale cancellations get reclaimed even during quiet periods.
fn spawn_sweeper(coordinator: Arc<Coordinator>, interval: std::time::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let released = coordinator.release_dead_jobs();
            if !released.is_empty() {
                tracing::warn!(count = released.len(), "released dead jobs");
            }
            let trimmed = coordinator.trim_canceled_jobs();
            if !trimmed.is_empty() {
                tracing::warn!(count = trimmed.len(), "trimmed canceled jobs");
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
