// src/server/initialization.rs

//! Handles server initialization: shared state, the worker pool, the listening
//! socket, and the optional metrics exporter.

use super::context::ServerContext;
use super::metrics_server::run_metrics_server;
use crate::config::Config;
use crate::core::state::ServerState;
use crate::core::worker_pool::WorkerPool;
use anyhow::{Context, Result, anyhow};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpSocket};
use tokio::task::JoinSet;
use tracing::info;

/// Initializes all server components before starting the main loop.
pub async fn setup(config: Config) -> Result<ServerContext> {
    log_startup_info(&config);

    let pool_size = config.pool_size;
    let metrics_enabled = config.metrics.enabled;

    let state = ServerState::initialize(config)?;
    info!("Server state initialized.");

    let pool = WorkerPool::with_stats(pool_size, state.coordinator.stats().clone())?;

    let listener = bind_listener(&state.config).await?;
    let local_addr = listener.local_addr()?;
    info!("Server listening on {}", local_addr);

    let mut background_tasks = JoinSet::new();
    if metrics_enabled {
        background_tasks.spawn(run_metrics_server(
            state.clone(),
            state.shutdown_tx.subscribe(),
        ));
    }

    Ok(ServerContext {
        state,
        listener,
        pool,
        background_tasks,
    })
}

/// Binds the chat listener with address reuse enabled and a backlog of
/// `max_clients` pending connections.
async fn bind_listener(config: &Config) -> Result<TcpListener> {
    let addr: SocketAddr = tokio::net::lookup_host((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to resolve {}:{}", config.host, config.port))?
        .next()
        .ok_or_else(|| anyhow!("No address found for {}:{}", config.host, config.port))?;

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket
        .bind(addr)
        .with_context(|| format!("Failed to bind to {addr}"))?;
    let listener = socket.listen(config.max_clients)?;
    Ok(listener)
}

fn log_startup_info(config: &Config) {
    info!("ChatRelay version {}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration: port={}, pool_size={}, max_clients={}, cache_capacity={}, time_quantum={}ms",
        config.port,
        config.pool_size,
        config.max_clients,
        config.cache_capacity,
        config.time_quantum_ms
    );
}
