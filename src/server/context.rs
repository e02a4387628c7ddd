// src/server/context.rs

use crate::core::state::ServerState;
use crate::core::worker_pool::WorkerPool;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;

/// Holds all the initialized state required to run the server's main loop.
pub struct ServerContext {
    pub state: Arc<ServerState>,
    pub listener: TcpListener,
    /// Admits whole sessions; its size bounds the number of active clients.
    pub pool: WorkerPool,
    pub background_tasks: JoinSet<()>,
}
