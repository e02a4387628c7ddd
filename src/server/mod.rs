// src/server/mod.rs

use crate::config::Config;
use anyhow::{Result, anyhow};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};

mod connection_loop;
mod context;
mod initialization;
mod metrics_server;

pub use connection_loop::run as serve;
pub use context::ServerContext;
pub use initialization::setup;

/// The main server startup function. Runs until SIGINT or SIGTERM; a second
/// signal during shutdown exits the process immediately.
pub async fn run(config: Config) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow!("Failed to register SIGINT handler: {}", e))?;
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow!("Failed to register SIGTERM handler: {}", e))?;

    let server_context = initialization::setup(config).await?;
    info!("Server is running. Press Ctrl+C to stop.");

    let shutdown = async move {
        tokio::select! {
            _ = sigint.recv() => info!("SIGINT received, initiating graceful shutdown."),
            _ = sigterm.recv() => info!("SIGTERM received, initiating graceful shutdown."),
        }
        tokio::spawn(async move {
            tokio::select! {
                _ = sigint.recv() => {}
                _ = sigterm.recv() => {}
            }
            warn!("Second signal received, forcing exit.");
            std::process::exit(0);
        });
    };

    connection_loop::run(server_context, shutdown).await;
    Ok(())
}
