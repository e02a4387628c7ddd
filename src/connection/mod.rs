// src/connection/mod.rs

//! Manages the lifecycle of a single client TCP connection: identity handshake,
//! registration, message dispatch, and deregistration.

mod guard;
mod handler;
mod session;

pub use guard::ConnectionGuard;
pub use handler::ConnectionHandler;
pub use session::{InvalidTransition, SessionPhase, SessionState};
