// src/core/message_cache.rs

//! A bounded, thread-safe cache of recently broadcast messages with LRU eviction.
//!
//! Entries live in a fixed array of `capacity` slots. A side map from message id to
//! slot index gives O(1) lookups; eviction scans the slots for the least recently
//! accessed entry, which is cheap because the capacity is a small configuration
//! constant rather than a function of traffic. Recency is ordered by a logical
//! sequence bumped on every insert and `update_access`; `last_access` records the
//! matching wall-clock instant.

use crate::core::ChatRelayError;
use crate::core::metrics;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::debug;

/// One cached message.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// `sender ⧺ "_" ⧺ created_at`. Not globally unique: two messages from the same
    /// sender within one second share an id.
    pub id: String,
    pub content: String,
    pub sender: String,
    /// Unix timestamp in seconds supplied by the caller.
    pub created_at: i64,
    pub last_access: Instant,
    /// Logical recency stamp; strictly increasing across inserts and accesses.
    pub access_seq: u64,
    pub access_count: u64,
    pub valid: bool,
}

#[derive(Debug)]
struct CacheSlots {
    slots: Vec<CacheEntry>,
    /// Number of slots in use. Slots at or beyond `size` are invalid.
    size: usize,
    index: HashMap<String, usize>,
    /// Source of `access_seq` values.
    clock: u64,
}

/// The message cache. Lookups take a shared lock; every mutation is exclusive.
#[derive(Debug)]
pub struct MessageCache {
    capacity: usize,
    inner: RwLock<CacheSlots>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl MessageCache {
    pub fn new(capacity: usize) -> Result<Self, ChatRelayError> {
        if capacity == 0 {
            return Err(ChatRelayError::InvalidCacheCapacity);
        }
        Ok(Self {
            capacity,
            inner: RwLock::new(CacheSlots {
                slots: Vec::with_capacity(capacity),
                size: 0,
                index: HashMap::with_capacity(capacity),
                clock: 0,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    /// Builds the composite id under which a message is cached.
    pub fn make_id(sender: &str, timestamp: i64) -> String {
        format!("{sender}_{timestamp}")
    }

    /// Inserts a message. Returns `false` without touching the existing entry if a
    /// message with the same id is already cached.
    pub fn insert(&self, sender: &str, content: &str, timestamp: i64) -> bool {
        let id = Self::make_id(sender, timestamp);
        let mut inner = self.inner.write();

        if inner.index.contains_key(&id) {
            return false;
        }

        let slot = if inner.size < self.capacity {
            let slot = inner.size;
            inner.size += 1;
            slot
        } else {
            let slot = inner.find_lru_slot();
            let evicted = inner.slots[slot].id.clone();
            inner.index.remove(&evicted);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            metrics::CACHE_EVICTIONS_TOTAL.inc();
            debug!("Evicted cached message '{}' from slot {}", evicted, slot);
            slot
        };

        let access_seq = inner.tick();
        let entry = CacheEntry {
            id: id.clone(),
            content: content.to_string(),
            sender: sender.to_string(),
            created_at: timestamp,
            last_access: Instant::now(),
            access_seq,
            access_count: 1,
            valid: true,
        };
        if slot < inner.slots.len() {
            inner.slots[slot] = entry;
        } else {
            inner.slots.push(entry);
        }
        inner.index.insert(id, slot);
        true
    }

    /// Returns the cached content for `id`. Counts a hit or a miss as a side effect;
    /// the entry itself is not touched.
    pub fn lookup(&self, id: &str) -> Option<String> {
        let inner = self.inner.read();
        let found = inner
            .index
            .get(id)
            .and_then(|&slot| inner.slots.get(slot))
            .filter(|entry| entry.valid)
            .map(|entry| entry.content.clone());

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            metrics::CACHE_HITS_TOTAL.inc();
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            metrics::CACHE_MISSES_TOTAL.inc();
        }
        found
    }

    /// Marks the entry as freshly used. No-op for an unknown id.
    pub fn update_access(&self, id: &str) {
        let mut inner = self.inner.write();
        let Some(&slot) = inner.index.get(id) else {
            return;
        };
        let access_seq = inner.tick();
        if let Some(entry) = inner.slots.get_mut(slot).filter(|e| e.valid) {
            entry.last_access = Instant::now();
            entry.access_seq = access_seq;
            entry.access_count += 1;
        }
    }

    /// Returns a copy of the entry without counting a hit or miss.
    pub fn peek(&self, id: &str) -> Option<CacheEntry> {
        let inner = self.inner.read();
        inner
            .index
            .get(id)
            .and_then(|&slot| inner.slots.get(slot))
            .filter(|entry| entry.valid)
            .cloned()
    }

    /// Hit percentage over all lookups, `0.0` before the first lookup.
    pub fn get_hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64 * 100.0
    }

    /// Invalidates every slot and resets the hit and miss counters.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        for entry in inner.slots.iter_mut() {
            entry.valid = false;
            entry.id.clear();
            entry.content.clear();
            entry.sender.clear();
        }
        inner.index.clear();
        inner.size = 0;
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// The number of valid entries.
    pub fn len(&self) -> usize {
        self.inner.read().slots.iter().filter(|e| e.valid).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

impl CacheSlots {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// The valid slot accessed least recently; ties go to the lowest index.
    fn find_lru_slot(&self) -> usize {
        let mut lru: Option<(usize, u64)> = None;
        for (i, entry) in self.slots[..self.size].iter().enumerate() {
            if !entry.valid {
                continue;
            }
            match lru {
                Some((_, oldest)) if entry.access_seq >= oldest => {}
                _ => lru = Some((i, entry.access_seq)),
            }
        }
        lru.map(|(i, _)| i).unwrap_or(0)
    }
}
