// src/connection/session.rs

//! Defines the state associated with a single client session.

use std::fmt;

/// The lifecycle of one accepted connection.
///
/// `Queued → Admitted → Registered → Active → Disconnecting → Deregistered`.
/// A session may also jump straight to `Deregistered` from `Queued` or `Admitted`
/// when it is closed before registering (shutdown or a failed handshake).
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum SessionPhase {
    Queued,
    Admitted,
    Registered,
    Active,
    Disconnecting,
    Deregistered,
}

impl SessionPhase {
    /// Whether `self → next` is a legal transition.
    pub fn can_advance_to(self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, next),
            (Queued, Admitted)
                | (Admitted, Registered)
                | (Registered, Active)
                | (Active, Disconnecting)
                | (Registered, Disconnecting)
                | (Disconnecting, Deregistered)
                | (Queued, Deregistered)
                | (Admitted, Deregistered)
        )
    }
}

/// Holds the state specific to a single client session.
#[derive(Debug)]
pub struct SessionState {
    pub connection_id: u64,
    /// Set once the identity handshake succeeds.
    pub user_id: Option<String>,
    phase: SessionPhase,
}

/// An attempted transition that the lifecycle does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: SessionPhase,
    pub to: SessionPhase,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid session transition {} -> {}", self.from, self.to)
    }
}

impl SessionState {
    /// A session that has been accepted and is waiting for a worker.
    pub fn new(connection_id: u64) -> Self {
        Self {
            connection_id,
            user_id: None,
            phase: SessionPhase::Queued,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Moves to `next`. `Deregistered` is terminal; nothing leaves it.
    pub fn advance(&mut self, next: SessionPhase) -> Result<(), InvalidTransition> {
        if !self.phase.can_advance_to(next) {
            return Err(InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        Ok(())
    }

    pub fn is_registered(&self) -> bool {
        matches!(
            self.phase,
            SessionPhase::Registered | SessionPhase::Active | SessionPhase::Disconnecting
        )
    }
}
