// src/core/roster.rs

//! The client roster: a circular, round-robin ordered membership list of connected
//! clients, kept independently of the broadcast registry.
//!
//! The circle is stored as an insertion-ordered map plus a cursor index. The
//! successor of the last member is the first, so removal is plain index deletion
//! with the cursor clamped back into range.

use crate::core::ChatRelayError;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// One roster member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterNode {
    pub connection_id: u64,
    pub user_id: String,
    /// When `next()` last selected this member.
    pub last_scheduled: Option<Instant>,
}

#[derive(Debug, Default)]
struct RosterInner {
    members: IndexMap<u64, RosterNode>,
    /// Index of the member `next()` will return. `None` iff the roster is empty.
    cursor: Option<usize>,
}

/// A point-in-time view of the roster in rotation order.
#[derive(Debug, Clone)]
pub struct RosterSnapshot {
    pub members: Vec<RosterNode>,
    pub current: Option<usize>,
}

impl fmt::Display for RosterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.members.is_empty() {
            return write!(f, "No clients scheduled");
        }
        writeln!(f, "Current schedule (round-robin):")?;
        for (pos, node) in self.members.iter().enumerate() {
            write!(
                f,
                "  [{pos}] {} (conn: {})",
                node.user_id, node.connection_id
            )?;
            if self.current == Some(pos) {
                write!(f, " <- CURRENT")?;
            }
            if pos + 1 < self.members.len() {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

/// The round-robin roster. All structural state sits behind one coarse lock.
#[derive(Debug)]
pub struct ClientRoster {
    inner: Mutex<RosterInner>,
    time_quantum: Duration,
}

impl ClientRoster {
    pub fn new(time_quantum: Duration) -> Result<Self, ChatRelayError> {
        if time_quantum.is_zero() {
            return Err(ChatRelayError::InvalidTimeQuantum);
        }
        info!(
            "Client roster initialized with {}ms time quantum",
            time_quantum.as_millis()
        );
        Ok(Self {
            inner: Mutex::new(RosterInner::default()),
            time_quantum,
        })
    }

    /// Appends a member to the end of the circle. Returns `false` if the
    /// connection is already present.
    pub fn add(&self, connection_id: u64, user_id: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.members.contains_key(&connection_id) {
            warn!("Roster: client {} already exists", connection_id);
            return false;
        }

        inner.members.insert(
            connection_id,
            RosterNode {
                connection_id,
                user_id: user_id.to_string(),
                last_scheduled: None,
            },
        );
        if inner.cursor.is_none() {
            inner.cursor = Some(0);
        }
        info!(
            "Roster: added client {} (conn: {}), total clients: {}",
            user_id,
            connection_id,
            inner.members.len()
        );
        true
    }

    /// Removes a member. If the cursor pointed at it, the cursor moves on to the
    /// removed member's successor. Returns `false` for an unknown connection.
    pub fn remove(&self, connection_id: u64) -> bool {
        let mut inner = self.inner.lock();
        let Some(idx) = inner.members.get_index_of(&connection_id) else {
            warn!("Roster: client with conn {} not found", connection_id);
            return false;
        };

        let Some((_, node)) = inner.members.shift_remove_index(idx) else {
            return false;
        };
        let len = inner.members.len();

        inner.cursor = match inner.cursor {
            _ if len == 0 => None,
            // The successor slides into the removed index; wrap if it was the tail.
            Some(c) if c == idx => Some(idx % len),
            Some(c) if c > idx => Some(c - 1),
            other => other,
        };

        info!(
            "Roster: removed client {} (conn: {}), total clients: {}",
            node.user_id, connection_id, len
        );
        true
    }

    /// Returns the member under the cursor, stamping its `last_scheduled`, and
    /// advances the cursor to its successor.
    pub fn next(&self) -> Option<RosterNode> {
        let mut inner = self.inner.lock();
        let current = inner.cursor?;
        let len = inner.members.len();

        let (_, node) = inner.members.get_index_mut(current)?;
        node.last_scheduled = Some(Instant::now());
        let selected = node.clone();

        inner.cursor = Some((current + 1) % len);
        Some(selected)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().members.is_empty()
    }

    pub fn contains(&self, connection_id: u64) -> bool {
        self.inner.lock().members.contains_key(&connection_id)
    }

    /// The connection the cursor currently points at.
    pub fn current(&self) -> Option<u64> {
        let inner = self.inner.lock();
        inner
            .cursor
            .and_then(|c| inner.members.get_index(c))
            .map(|(id, _)| *id)
    }

    pub fn snapshot(&self) -> RosterSnapshot {
        let inner = self.inner.lock();
        RosterSnapshot {
            members: inner.members.values().cloned().collect(),
            current: inner.cursor,
        }
    }

    pub fn time_quantum(&self) -> Duration {
        self.time_quantum
    }
}
