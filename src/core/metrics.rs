// src/core/metrics.rs

//! Defines and registers Prometheus metrics for server monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, TextEncoder, register_counter, register_gauge};

lazy_static! {
    // --- Server-wide Gauges ---
    /// The number of clients currently registered for broadcast.
    pub static ref CONNECTED_CLIENTS: Gauge =
        register_gauge!("chatrelay_connected_clients", "Number of currently registered clients.").unwrap();
    /// The number of pool workers currently running a session.
    pub static ref ACTIVE_WORKERS: Gauge =
        register_gauge!("chatrelay_active_workers", "Number of workers currently running a session.").unwrap();
    /// The number of accepted connections waiting for a free worker.
    pub static ref QUEUED_SESSIONS: Gauge =
        register_gauge!("chatrelay_queued_sessions", "Number of sessions waiting for a worker.").unwrap();


    // --- Server-wide Counters ---
    /// The total number of connections accepted by the server since startup.
    pub static ref CONNECTIONS_RECEIVED_TOTAL: Counter =
        register_counter!("chatrelay_connections_received_total", "Total number of connections received.").unwrap();
    /// The total number of records delivered to recipients.
    pub static ref MESSAGES_SENT_TOTAL: Counter =
        register_counter!("chatrelay_messages_sent_total", "Total number of messages delivered to clients.").unwrap();
    /// The total number of records received from clients.
    pub static ref MESSAGES_RECEIVED_TOTAL: Counter =
        register_counter!("chatrelay_messages_received_total", "Total number of messages received from clients.").unwrap();
    /// The total number of failed deliveries.
    pub static ref DELIVERY_FAILURES_TOTAL: Counter =
        register_counter!("chatrelay_delivery_failures_total", "Total number of failed deliveries.").unwrap();


    // --- Cache Counters ---
    pub static ref CACHE_HITS_TOTAL: Counter =
        register_counter!("chatrelay_cache_hits_total", "Total number of message cache hits.").unwrap();
    pub static ref CACHE_MISSES_TOTAL: Counter =
        register_counter!("chatrelay_cache_misses_total", "Total number of message cache misses.").unwrap();
    /// The total number of cache entries replaced by LRU eviction.
    pub static ref CACHE_EVICTIONS_TOTAL: Counter =
        register_counter!("chatrelay_cache_evictions_total", "Total number of message cache evictions.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap_or_default()
}
