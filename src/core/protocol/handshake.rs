// src/core/protocol/handshake.rs

//! The identity handshake that precedes the framed record stream. A freshly
//! connected peer sends its user id as raw bytes, not wrapped in a wire record.

use crate::core::ChatRelayError;
use bytes::BytesMut;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Upper bound on the bytes read for the identity in a single receive.
const IDENTITY_READ_LEN: usize = super::wire_message::MAX_PAYLOAD_LEN;

/// The outcome of a successful handshake.
#[derive(Debug)]
pub struct Handshake {
    pub user_id: String,
    /// Bytes received after the identity's terminating NUL. These already belong
    /// to the record stream and must be handed to the framed reader.
    pub leftover: BytesMut,
}

/// Reads the peer's identity with a single receive bounded by `timeout`.
pub async fn read_identity<R>(
    reader: &mut R,
    max_len: usize,
    timeout: Duration,
) -> Result<Handshake, ChatRelayError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(IDENTITY_READ_LEN);
    let n = match tokio::time::timeout(timeout, reader.read_buf(&mut buf)).await {
        Ok(res) => res?,
        Err(_) => return Err(ChatRelayError::HandshakeTimeout),
    };
    if n == 0 {
        return Err(ChatRelayError::ConnectionClosed);
    }
    parse_identity(buf, max_len)
}

/// Splits a raw handshake buffer into the user id and any trailing record bytes,
/// then validates the id.
pub fn parse_identity(mut buf: BytesMut, max_len: usize) -> Result<Handshake, ChatRelayError> {
    let leftover = match buf.iter().position(|&b| b == 0) {
        Some(nul) => {
            let mut rest = buf.split_off(nul);
            let _ = rest.split_to(1);
            rest
        }
        None => BytesMut::new(),
    };

    let raw = String::from_utf8_lossy(&buf);
    let user_id = raw.trim_end_matches(['\r', '\n']).to_string();

    if user_id.is_empty() {
        return Err(ChatRelayError::InvalidUsername("empty user id".to_string()));
    }
    if user_id.len() > max_len {
        return Err(ChatRelayError::InvalidUsername(format!(
            "user id exceeds {max_len} bytes"
        )));
    }

    Ok(Handshake { user_id, leftover })
}
