// src/core/protocol/mod.rs

pub mod handshake;
pub mod wire_message;
pub use handshake::{Handshake, read_identity};
pub use wire_message::{MessageType, WIRE_MESSAGE_LEN, WireMessage, WireMessageCodec};
