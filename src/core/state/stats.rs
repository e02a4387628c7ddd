// src/core/state/stats.rs

//! Contains state definitions and logic for server statistics.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Holds the aggregate relay counters. Message and cache counters only grow;
/// `active_clients` and `active_threads` track current values.
#[derive(Debug, Default)]
pub struct StatsState {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    active_clients: AtomicUsize,
    active_threads: AtomicUsize,
}

/// A consistent-enough copy of the counters for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub active_clients: usize,
    pub active_threads: usize,
}

impl StatsState {
    /// Creates a new `StatsState` with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_messages_sent(&self, n: u64) {
        self.messages_sent.fetch_add(n, Ordering::Relaxed);
    }

    pub fn increment_messages_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_active_clients(&self) {
        self.active_clients.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrements the active client count, saturating at zero.
    pub fn decrement_active_clients(&self) {
        let _ = self
            .active_clients
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn set_active_clients(&self, n: usize) {
        self.active_clients.store(n, Ordering::Relaxed);
    }

    pub fn increment_active_threads(&self) {
        self.active_threads.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrements the busy worker count, saturating at zero.
    pub fn decrement_active_threads(&self) {
        let _ = self
            .active_threads
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Copies the cache counters in. They can only move forward.
    pub fn sync_cache_counters(&self, hits: u64, misses: u64) {
        self.cache_hits.fetch_max(hits, Ordering::Relaxed);
        self.cache_misses.fetch_max(misses, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            active_clients: self.active_clients.load(Ordering::Relaxed),
            active_threads: self.active_threads.load(Ordering::Relaxed),
        }
    }
}
