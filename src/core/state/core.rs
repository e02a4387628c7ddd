// src/core/state/core.rs

//! Defines the central `ServerState` struct, holding all shared server-wide state.

use super::stats::StatsState;
use crate::config::Config;
use crate::core::ChatRelayError;
use crate::core::broadcast::BroadcastCoordinator;
use crate::core::message_cache::MessageCache;
use crate::core::roster::ClientRoster;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

/// The central struct holding all shared, server-wide state.
/// It is wrapped in an `Arc` and handed to every session task. Each service keeps
/// its own internal locking, so holding the `Arc` never implies holding a lock.
#[derive(Debug)]
pub struct ServerState {
    /// The resolved configuration. Fixed for the lifetime of the process.
    pub config: Config,
    /// Owns the client registry and fans messages out.
    pub coordinator: BroadcastCoordinator,
    /// Connections accepted and queued for a worker but not yet started, keyed by
    /// connection id. They are not in the registry until their session runs.
    pub pending_admissions: DashMap<u64, SocketAddr>,
    /// Fires once when the server begins shutting down.
    pub shutdown_tx: broadcast::Sender<()>,
    shutting_down: AtomicBool,
}

impl ServerState {
    /// Builds every service from the configuration. Fails on an invalid cache
    /// capacity or time quantum; nothing partially built escapes.
    pub fn initialize(config: Config) -> Result<Arc<Self>, ChatRelayError> {
        let cache = Arc::new(MessageCache::new(config.cache_capacity)?);
        let roster = Arc::new(ClientRoster::new(Duration::from_millis(
            config.time_quantum_ms,
        ))?);
        let stats = Arc::new(StatsState::new());
        let (shutdown_tx, _) = broadcast::channel(1);

        info!(
            "Message cache initialized with capacity {}",
            config.cache_capacity
        );

        Ok(Arc::new(Self {
            config,
            coordinator: BroadcastCoordinator::new(roster, cache, stats),
            pending_admissions: DashMap::new(),
            shutdown_tx,
            shutting_down: AtomicBool::new(false),
        }))
    }

    /// Marks the server as shutting down and wakes every session waiting on the
    /// global shutdown channel. Returns `false` if shutdown had already begun.
    pub fn begin_shutdown(&self) -> bool {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return false;
        }
        // No receivers just means no session is currently running.
        let _ = self.shutdown_tx.send(());
        true
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}
