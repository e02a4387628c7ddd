// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard for session deregistration.

use crate::core::state::ServerState;
use std::sync::Arc;
use tracing::{debug, info};

/// Deregisters a session when dropped, whichever way the session ended: read
/// error, peer quit, shutdown, or a panic inside the handler.
pub struct ConnectionGuard {
    state: Arc<ServerState>,
    connection_id: u64,
    user_id: String,
}

impl ConnectionGuard {
    /// Creates the guard. Call only once the session has been registered.
    pub(crate) fn new(state: Arc<ServerState>, connection_id: u64, user_id: String) -> Self {
        Self {
            state,
            connection_id,
            user_id,
        }
    }
}

impl Drop for ConnectionGuard {
    /// Removes the client from the roster and the registry, then announces the
    /// departure to everyone still connected.
    fn drop(&mut self) {
        debug!(
            "ConnectionGuard dropping, deregistering connection {}",
            self.connection_id
        );
        self.state
            .coordinator
            .leave(self.connection_id, &self.user_id);
        info!(
            "Client disconnected: {} (conn: {})",
            self.user_id, self.connection_id
        );
    }
}
