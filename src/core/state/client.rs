// src/core/state/client.rs

//! Contains the live client registry used for broadcast, and the records it holds.

use crate::core::protocol::WireMessage;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc};

/// The per-client delivery queue. A writer task drains it into the socket.
pub type OutboundSender = mpsc::Sender<WireMessage>;
/// Signals one session to terminate.
pub type ShutdownSender = broadcast::Sender<()>;

/// The registry entry for one connected client.
#[derive(Debug)]
pub struct ClientRecord {
    pub connection_id: u64,
    pub user_id: String,
    pub addr: Option<SocketAddr>,
    pub connected_at: Instant,
    pub last_active: Instant,
    /// `false` marks a record whose delivery failed; it stays registered until
    /// its session ends.
    pub active: bool,
    outbound: OutboundSender,
    kill_switch: ShutdownSender,
}

impl ClientRecord {
    pub fn new(
        connection_id: u64,
        user_id: impl Into<String>,
        addr: Option<SocketAddr>,
        outbound: OutboundSender,
        kill_switch: ShutdownSender,
    ) -> Self {
        let now = Instant::now();
        Self {
            connection_id,
            user_id: user_id.into(),
            addr,
            connected_at: now,
            last_active: now,
            active: true,
            outbound,
            kill_switch,
        }
    }

    /// Hands a copy of `msg` to the client's delivery queue without waiting.
    /// A full or closed queue counts as a failed delivery.
    fn deliver(&self, msg: &WireMessage) -> bool {
        self.outbound.try_send(msg.clone()).is_ok()
    }
}

/// The result of fanning one message out across the registry.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FanOut {
    pub delivered: u64,
    pub failed: Vec<u64>,
}

/// The registry of connected clients keyed by connection id, guarded by a single
/// exclusive lock.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: Mutex<BTreeMap<u64, ClientRecord>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record, replacing any stale record under the same id.
    pub fn insert(&self, record: ClientRecord) {
        self.clients.lock().insert(record.connection_id, record);
    }

    pub fn remove(&self, connection_id: u64) -> Option<ClientRecord> {
        self.clients.lock().remove(&connection_id)
    }

    /// Attempts delivery to every active record except `excluding`. Failures are
    /// collected, not applied, so the caller can mark them after the lock is dropped.
    pub fn fan_out(&self, msg: &WireMessage, excluding: Option<u64>) -> FanOut {
        let clients = self.clients.lock();
        let mut result = FanOut::default();
        for (id, record) in clients.iter() {
            if !record.active || Some(*id) == excluding {
                continue;
            }
            if record.deliver(msg) {
                result.delivered += 1;
            } else {
                result.failed.push(*id);
            }
        }
        result
    }

    /// Delivers to a single client, regardless of the `active` flag.
    pub fn send_to(&self, connection_id: u64, msg: &WireMessage) -> bool {
        self.clients
            .lock()
            .get(&connection_id)
            .is_some_and(|record| record.deliver(msg))
    }

    /// Soft-removes a record and signals its session to end, so the session
    /// deregisters through its own teardown. Returns the user id if the record
    /// was present.
    pub fn mark_inactive(&self, connection_id: u64) -> Option<String> {
        self.clients.lock().get_mut(&connection_id).map(|record| {
            record.active = false;
            // A send error only means the session already stopped listening.
            let _ = record.kill_switch.send(());
            record.user_id.clone()
        })
    }

    /// Refreshes `last_active` for a client.
    pub fn touch(&self, connection_id: u64) {
        if let Some(record) = self.clients.lock().get_mut(&connection_id) {
            record.last_active = Instant::now();
        }
    }

    pub fn is_active(&self, connection_id: u64) -> bool {
        self.clients
            .lock()
            .get(&connection_id)
            .is_some_and(|record| record.active)
    }

    pub fn contains(&self, connection_id: u64) -> bool {
        self.clients.lock().contains_key(&connection_id)
    }

    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }

    /// Fires every client's kill switch and marks them inactive. Returns the number
    /// of sessions signalled.
    pub fn disconnect_all(&self) -> usize {
        let mut clients = self.clients.lock();
        let mut signalled = 0;
        for record in clients.values_mut().filter(|r| r.active) {
            record.active = false;
            // A send error only means the session already stopped listening.
            let _ = record.kill_switch.send(());
            signalled += 1;
        }
        signalled
    }

    /// Fires one client's kill switch.
    pub fn disconnect(&self, connection_id: u64) -> bool {
        self.clients
            .lock()
            .get(&connection_id)
            .is_some_and(|record| record.kill_switch.send(()).is_ok())
    }
}
