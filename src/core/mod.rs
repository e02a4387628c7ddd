// src/core/mod.rs

//! The central module containing the core logic and data structures of ChatRelay.

pub mod broadcast;
pub mod errors;
pub mod message_cache;
pub mod metrics;
pub mod protocol;
pub mod roster;
pub mod state;
pub mod worker_pool;

pub use errors::ChatRelayError;
pub use protocol::WireMessage;

/// The current Unix time in whole seconds, the granularity used on the wire and
/// in cache ids.
pub fn unix_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
