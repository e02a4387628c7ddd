// tests/property/codec_test.rs

//! Property-based tests for the wire codec
//! Tests that arbitrary input never breaks framing and that field limits hold

use bytes::BytesMut;
use chatrelay::core::protocol::wire_message::{MAX_PAYLOAD_LEN, MAX_SENDER_LEN};
use chatrelay::core::protocol::{MessageType, WIRE_MESSAGE_LEN, WireMessage, WireMessageCodec};
use proptest::prelude::*;
use tokio_util::codec::{Decoder, Encoder};

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        max_shrink_iters: 500,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_decoder_consumes_whole_records_only(
        bytes in prop::collection::vec(any::<u8>(), 0..(WIRE_MESSAGE_LEN * 3))
    ) {
        let mut buf = BytesMut::from(&bytes[..]);
        let mut codec = WireMessageCodec;
        let mut decoded = 0;
        while let Some(_msg) = codec.decode(&mut buf).unwrap() {
            decoded += 1;
        }
        prop_assert_eq!(decoded, bytes.len() / WIRE_MESSAGE_LEN);
        prop_assert_eq!(buf.len(), bytes.len() % WIRE_MESSAGE_LEN);
    }

    #[test]
    fn test_encoded_fields_respect_limits(
        sender in ".{0,100}",
        payload in ".{0,5000}",
        timestamp in any::<i64>()
    ) {
        let msg = WireMessage::new(MessageType::Text, &sender, &payload, timestamp);
        prop_assert!(msg.sender.len() <= MAX_SENDER_LEN);
        prop_assert!(msg.payload.len() <= MAX_PAYLOAD_LEN);
        prop_assert!(sender.starts_with(&msg.sender));
        prop_assert!(payload.starts_with(&msg.payload));

        let mut buf = BytesMut::new();
        WireMessageCodec.encode(msg.clone(), &mut buf).unwrap();
        prop_assert_eq!(buf.len(), WIRE_MESSAGE_LEN);

        // NUL characters end a field on the wire, so compare up to the first one.
        let decoded = WireMessageCodec.decode(&mut buf).unwrap().unwrap();
        let expected_payload = msg.payload.split('\0').next().unwrap_or_default();
        prop_assert_eq!(decoded.payload.as_str(), expected_payload);
        prop_assert_eq!(decoded.timestamp, timestamp);
    }
}
