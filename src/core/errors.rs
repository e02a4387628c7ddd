// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the relay.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug, Clone)]
pub enum ChatRelayError {
    // --- Construction errors ---
    #[error("Worker pool size must be positive")]
    InvalidPoolSize,

    #[error("Cache capacity must be positive")]
    InvalidCacheCapacity,

    #[error("Time quantum must be positive")]
    InvalidTimeQuantum,

    // --- Admission errors ---
    #[error("Cannot enqueue task on stopped worker pool")]
    PoolStopped,

    // --- Transport errors ---
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Timed out waiting for the identity handshake")]
    HandshakeTimeout,

    #[error("Invalid user id: {0}")]
    InvalidUsername(String),

    // --- Protocol errors ---
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for ChatRelayError {
    fn from(e: std::io::Error) -> Self {
        ChatRelayError::Io(Arc::new(e))
    }
}

impl ChatRelayError {
    /// Returns true for the errors that abort startup instead of a single session.
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            ChatRelayError::InvalidPoolSize
                | ChatRelayError::InvalidCacheCapacity
                | ChatRelayError::InvalidTimeQuantum
        )
    }
}
