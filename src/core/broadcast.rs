// src/core/broadcast.rs

//! The broadcast coordinator. It owns the live client registry and the relay
//! counters, fans each inbound message out to every other active client, folds
//! delivery failures into membership cleanup, and records messages in the cache.
//!
//! The registry, roster and cache locks are never nested: the registry lock is
//! released before any failure is applied, and the roster and cache are touched
//! only after it is dropped.

use crate::core::message_cache::MessageCache;
use crate::core::metrics;
use crate::core::protocol::{MessageType, WireMessage};
use crate::core::roster::ClientRoster;
use crate::core::state::{ClientRecord, ClientRegistry, FanOut, StatsSnapshot, StatsState};
use crate::core::unix_timestamp;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The sender name used for relay-generated replies.
pub const SERVER_SENDER: &str = "SERVER";

/// How far back (in seconds) the duplicate probe looks before a TEXT broadcast.
const DEDUP_PROBE_OFFSET: i64 = 5;
/// How many preceding seconds are probed, and refreshed on a hit, after a broadcast.
const RECENT_PROBE_WINDOW: i64 = 3;

#[derive(Debug)]
pub struct BroadcastCoordinator {
    registry: ClientRegistry,
    stats: Arc<StatsState>,
    roster: Arc<ClientRoster>,
    cache: Arc<MessageCache>,
}

impl BroadcastCoordinator {
    pub fn new(roster: Arc<ClientRoster>, cache: Arc<MessageCache>, stats: Arc<StatsState>) -> Self {
        Self {
            registry: ClientRegistry::new(),
            stats,
            roster,
            cache,
        }
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    pub fn roster(&self) -> &Arc<ClientRoster> {
        &self.roster
    }

    pub fn cache(&self) -> &Arc<MessageCache> {
        &self.cache
    }

    pub fn stats(&self) -> &Arc<StatsState> {
        &self.stats
    }

    /// Registers a new session: registry record, roster membership, then a join
    /// notice to everyone else.
    pub fn join(&self, record: ClientRecord) {
        let connection_id = record.connection_id;
        let user_id = record.user_id.clone();

        self.registry.insert(record);
        self.stats.increment_active_clients();
        metrics::CONNECTED_CLIENTS.inc();

        self.roster.add(connection_id, &user_id);

        let notice = WireMessage::join_notice(&user_id, unix_timestamp());
        self.broadcast(&notice, Some(connection_id));
    }

    /// Deregisters a session and tells the remaining clients it left. Safe to call
    /// for a session that never finished registering.
    pub fn leave(&self, connection_id: u64, user_id: &str) {
        self.roster.remove(connection_id);

        if self.registry.remove(connection_id).is_some() {
            self.stats.decrement_active_clients();
            metrics::CONNECTED_CLIENTS.dec();
        }

        let notice = WireMessage::leave_notice(user_id, unix_timestamp());
        self.broadcast(&notice, None);
    }

    /// Delivers `msg` to every active client except `excluding`, soft-removes the
    /// clients whose delivery failed, and records the message in the cache.
    pub fn broadcast(&self, msg: &WireMessage, excluding: Option<u64>) -> FanOut {
        let fan_out = self.registry.fan_out(msg, excluding);

        self.stats.add_messages_sent(fan_out.delivered);
        metrics::MESSAGES_SENT_TOTAL.inc_by(fan_out.delivered as f64);

        for &connection_id in &fan_out.failed {
            metrics::DELIVERY_FAILURES_TOTAL.inc();
            if let Some(user_id) = self.registry.mark_inactive(connection_id) {
                warn!("Client connection lost: {} (conn: {})", user_id, connection_id);
            }
        }

        if !self.cache.insert(&msg.sender, &msg.payload, msg.timestamp) {
            // Same sender within the same second: the cache id collides.
            debug!(
                "Message from '{}' at {} already cached, skipping",
                msg.sender, msg.timestamp
            );
        }

        fan_out
    }

    /// Processes one TEXT message from a session: probes the cache, stamps the
    /// message with server time, broadcasts it, then refreshes recent entries.
    pub fn relay_text(&self, connection_id: u64, user_id: &str, mut msg: WireMessage) -> FanOut {
        if msg.sender.is_empty() {
            msg.set_sender(user_id);
        }

        let probe = MessageCache::make_id(&msg.sender, msg.timestamp - DEDUP_PROBE_OFFSET);
        let _ = self.cache.lookup(&probe);

        msg.timestamp = unix_timestamp();
        let fan_out = self.broadcast(&msg, Some(connection_id));
        info!("Message from {}: {}", user_id, msg.payload);

        for back in 1..=RECENT_PROBE_WINDOW {
            let id = MessageCache::make_id(user_id, msg.timestamp - back);
            if self.cache.lookup(&id).is_some() {
                self.cache.update_access(&id);
            }
        }

        fan_out
    }

    /// Records an inbound message against the counters and the sender's record.
    pub fn record_received(&self, connection_id: u64) {
        self.stats.increment_messages_received();
        metrics::MESSAGES_RECEIVED_TOTAL.inc();
        self.registry.touch(connection_id);
    }

    /// Pulls the cache counters and the registry size into the stats.
    pub fn refresh_stats(&self) -> StatsSnapshot {
        self.stats.set_active_clients(self.registry.len());
        self.stats
            .sync_cache_counters(self.cache.hits(), self.cache.misses());
        self.stats.snapshot()
    }

    /// The human-readable statistics banner.
    pub fn stats_report(&self) -> String {
        let snapshot = self.refresh_stats();
        let mut report = String::new();
        let _ = writeln!(report, "\n=== SERVER STATISTICS ===");
        let _ = writeln!(report, "Messages Sent:     {}", snapshot.messages_sent);
        let _ = writeln!(report, "Messages Received: {}", snapshot.messages_received);
        let _ = writeln!(report, "Active Clients:    {}", snapshot.active_clients);
        let _ = writeln!(report, "Active Workers:    {}", snapshot.active_threads);
        let _ = writeln!(report, "Cache Hits:        {}", snapshot.cache_hits);
        let _ = writeln!(report, "Cache Misses:      {}", snapshot.cache_misses);
        let _ = writeln!(
            report,
            "Cache Hit Rate:    {:.2}%",
            self.cache.get_hit_rate()
        );
        let _ = writeln!(
            report,
            "Cache Size:        {}/{}",
            self.cache.len(),
            self.cache.capacity()
        );
        report.push_str("=========================");
        report
    }

    /// Sends the statistics banner to one client only. Returns whether it was queued.
    pub fn reply_status(&self, connection_id: u64) -> bool {
        let report = self.stats_report();
        let reply = WireMessage::new(MessageType::Text, SERVER_SENDER, &report, unix_timestamp());
        self.registry.send_to(connection_id, &reply)
    }

    /// Logs the statistics banner line by line.
    pub fn log_stats(&self) {
        for line in self.stats_report().lines().filter(|l| !l.is_empty()) {
            info!("{}", line);
        }
    }
}
