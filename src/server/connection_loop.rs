// src/server/connection_loop.rs

//! Contains the main server loop for accepting connections and handling graceful shutdown.

use super::context::ServerContext;
use crate::connection::ConnectionHandler;
use crate::core::metrics;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tracing::{error, info, warn};

/// The main server loop. Accepts connections and queues each one on the worker
/// pool until `shutdown` resolves, then tears the server down.
pub async fn run(mut ctx: ServerContext, shutdown: impl Future<Output = ()>) {
    tokio::pin!(shutdown);
    let mut connection_counter: u64 = 0;

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("Shutdown requested, stopping the accept loop.");
                break;
            }

            Some(res) = ctx.background_tasks.join_next() => {
                if let Err(e) = res {
                    error!("A background task terminated abnormally: {e:?}");
                }
            }

            res = ctx.listener.accept() => {
                match res {
                    Ok((socket, addr)) => {
                        connection_counter = connection_counter.wrapping_add(1);
                        admit(&ctx, socket, addr, connection_counter);
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                }
            }
        }
    }

    shutdown_sequence(ctx).await;
}

/// Queues one accepted connection for a worker.
fn admit(ctx: &ServerContext, socket: TcpStream, addr: SocketAddr, connection_id: u64) {
    info!("New connection from {}", addr);
    metrics::CONNECTIONS_RECEIVED_TOTAL.inc();

    ctx.state.pending_admissions.insert(connection_id, addr);
    let state = ctx.state.clone();
    let session = async move {
        ConnectionHandler::new(socket, addr, state, connection_id)
            .run()
            .await
    };

    if let Err(e) = ctx.pool.enqueue(session) {
        // The rejected task owned the socket; dropping it closed the connection.
        ctx.state.pending_admissions.remove(&connection_id);
        error!("Failed to enqueue client {}: {}", addr, e);
    }
}

async fn shutdown_sequence(ctx: ServerContext) {
    let ServerContext {
        state,
        listener,
        pool,
        mut background_tasks,
    } = ctx;
    drop(listener);

    info!("Shutting down server...");
    state.begin_shutdown();

    let pending = state.pending_admissions.len();
    if pending > 0 {
        info!(
            "{} queued connection(s) will be closed without being served.",
            pending
        );
    }

    let signalled = state.coordinator.registry().disconnect_all();
    info!("Signalled {} connected client(s) to disconnect.", signalled);

    pool.shutdown().await;
    info!("All client sessions closed.");

    while let Some(res) = background_tasks.join_next().await {
        if let Err(e) = res {
            warn!("Background task finished with error: {e:?}");
        }
    }

    info!("Final statistics:");
    state.coordinator.log_stats();
    info!("Server shutdown complete.");
}
