// src/core/protocol/wire_message.rs

//! Implements the fixed-size wire record exchanged between chat clients and the
//! relay, together with the `Encoder` and `Decoder` used on every connection.

use crate::core::ChatRelayError;
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Size of the NUL-terminated sender name field.
pub const SENDER_FIELD_LEN: usize = 64;
/// Size of the NUL-terminated payload field.
pub const PAYLOAD_FIELD_LEN: usize = 4096;
/// The longest sender name that still leaves room for the terminating NUL.
pub const MAX_SENDER_LEN: usize = SENDER_FIELD_LEN - 1;
/// The longest payload that still leaves room for the terminating NUL.
pub const MAX_PAYLOAD_LEN: usize = PAYLOAD_FIELD_LEN - 1;

// Byte offsets of each field. The record mirrors the natural C layout on a 64-bit
// host: the 8-byte timestamp is aligned, which leaves 4 bytes of tail padding
// after the payload.
const TYPE_OFFSET: usize = 0;
const SENDER_ID_OFFSET: usize = 4;
const PAYLOAD_SIZE_OFFSET: usize = 8;
const SENDER_OFFSET: usize = 12;
const PAYLOAD_OFFSET: usize = SENDER_OFFSET + SENDER_FIELD_LEN;
const TIMESTAMP_OFFSET: usize = 4176;

/// The total size of one record on the wire.
pub const WIRE_MESSAGE_LEN: usize = TIMESTAMP_OFFSET + 8;

/// The kind of a wire record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum MessageType {
    Text,
    Join,
    Leave,
    /// Reserved, never produced by the relay.
    Audio,
    /// Reserved, never produced by the relay.
    Video,
    Status,
    /// Reserved, never produced by the relay.
    CacheTest,
    /// Any type byte outside the known set.
    Unknown(u8),
}

impl MessageType {
    pub fn from_u8(byte: u8) -> Self {
        match byte {
            0x01 => MessageType::Text,
            0x02 => MessageType::Join,
            0x03 => MessageType::Leave,
            0x04 => MessageType::Audio,
            0x05 => MessageType::Video,
            0x06 => MessageType::Status,
            0x07 => MessageType::CacheTest,
            other => MessageType::Unknown(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            MessageType::Text => 0x01,
            MessageType::Join => 0x02,
            MessageType::Leave => 0x03,
            MessageType::Audio => 0x04,
            MessageType::Video => 0x05,
            MessageType::Status => 0x06,
            MessageType::CacheTest => 0x07,
            MessageType::Unknown(other) => other,
        }
    }
}

/// One application message, decoded from (or ready to be encoded into) a
/// fixed-size wire record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub kind: MessageType,
    pub sender_id: u32,
    pub payload_size: u32,
    pub sender: String,
    pub payload: String,
    /// Unix timestamp in seconds.
    pub timestamp: i64,
}

impl WireMessage {
    /// Builds a message, truncating the sender and payload to their field limits.
    pub fn new(kind: MessageType, sender: &str, payload: &str, timestamp: i64) -> Self {
        let mut msg = Self {
            kind,
            sender_id: 0,
            payload_size: 0,
            sender: String::new(),
            payload: String::new(),
            timestamp,
        };
        msg.set_sender(sender);
        msg.set_payload(payload);
        msg
    }

    /// A broadcast notice announcing that `user_id` joined.
    pub fn join_notice(user_id: &str, timestamp: i64) -> Self {
        Self::new(
            MessageType::Join,
            user_id,
            &format!("{user_id} has joined the chat"),
            timestamp,
        )
    }

    /// A broadcast notice announcing that `user_id` left.
    pub fn leave_notice(user_id: &str, timestamp: i64) -> Self {
        Self::new(
            MessageType::Leave,
            user_id,
            &format!("{user_id} has left the chat"),
            timestamp,
        )
    }

    pub fn set_sender(&mut self, name: &str) {
        self.sender = truncate_on_char_boundary(name, MAX_SENDER_LEN).to_string();
    }

    /// Sets the payload and keeps `payload_size` in sync with it.
    pub fn set_payload(&mut self, content: &str) {
        self.payload = truncate_on_char_boundary(content, MAX_PAYLOAD_LEN).to_string();
        self.payload_size = self.payload.len() as u32;
    }

    /// Writes the record into `dst` using the fixed wire layout.
    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(WIRE_MESSAGE_LEN);
        dst.put_u8(self.kind.as_u8());
        dst.put_bytes(0, SENDER_ID_OFFSET - TYPE_OFFSET - 1);
        dst.put_u32_le(self.sender_id);
        dst.put_u32_le(self.payload_size);
        put_nul_terminated(dst, self.sender.as_bytes(), SENDER_FIELD_LEN);
        put_nul_terminated(dst, self.payload.as_bytes(), PAYLOAD_FIELD_LEN);
        dst.put_bytes(0, TIMESTAMP_OFFSET - (PAYLOAD_OFFSET + PAYLOAD_FIELD_LEN));
        dst.put_i64_le(self.timestamp);
    }

    /// Parses exactly one record from `record`, which must be `WIRE_MESSAGE_LEN` bytes.
    pub fn read_from(record: &[u8]) -> Result<Self, ChatRelayError> {
        if record.len() != WIRE_MESSAGE_LEN {
            return Err(ChatRelayError::Protocol(format!(
                "expected {WIRE_MESSAGE_LEN} byte record, got {}",
                record.len()
            )));
        }

        let sender_id = (&record[SENDER_ID_OFFSET..PAYLOAD_SIZE_OFFSET]).get_u32_le();
        let payload_size = (&record[PAYLOAD_SIZE_OFFSET..SENDER_OFFSET]).get_u32_le();
        let mut ts = &record[TIMESTAMP_OFFSET..WIRE_MESSAGE_LEN];

        Ok(Self {
            kind: MessageType::from_u8(record[TYPE_OFFSET]),
            sender_id,
            payload_size,
            sender: read_nul_terminated(&record[SENDER_OFFSET..PAYLOAD_OFFSET]),
            payload: read_nul_terminated(
                &record[PAYLOAD_OFFSET..PAYLOAD_OFFSET + PAYLOAD_FIELD_LEN],
            ),
            timestamp: ts.get_i64_le(),
        })
    }
}

/// Returns the longest prefix of `s` that fits in `max` bytes without splitting a character.
pub fn truncate_on_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn put_nul_terminated(dst: &mut BytesMut, value: &[u8], field_len: usize) {
    let n = value.len().min(field_len - 1);
    dst.put_slice(&value[..n]);
    dst.put_bytes(0, field_len - n);
}

fn read_nul_terminated(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// A `tokio_util::codec` implementation for `WireMessage` records.
#[derive(Debug, Default, Clone, Copy)]
pub struct WireMessageCodec;

impl Encoder<WireMessage> for WireMessageCodec {
    type Error = ChatRelayError;

    fn encode(&mut self, item: WireMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.write_to(dst);
        Ok(())
    }
}

impl Decoder for WireMessageCodec {
    type Item = WireMessage;
    type Error = ChatRelayError;

    /// Waits until a complete record is buffered. Records are fixed-size, so there
    /// is no way for the stream to desynchronise short of a truncated connection.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < WIRE_MESSAGE_LEN {
            src.reserve(WIRE_MESSAGE_LEN - src.len());
            return Ok(None);
        }
        let record = src.split_to(WIRE_MESSAGE_LEN);
        WireMessage::read_from(&record).map(Some)
    }
}
