// tests/integration/relay_test.rs

use super::test_helpers::{TestClient, TestServer, encode_record, wait_until};
use chatrelay::core::broadcast::SERVER_SENDER;
use chatrelay::core::protocol::{MessageType, WireMessage};
use chatrelay::core::unix_timestamp;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_join_notice_reaches_existing_clients() {
    let server = TestServer::start().await;

    let mut alice = TestClient::connect(server.addr, "alice").await;
    server.wait_for_registered(1).await;
    let _bob = TestClient::connect(server.addr, "bob").await;

    let notice = alice.recv().await;
    assert_eq!(notice.kind, MessageType::Join);
    assert_eq!(notice.payload, "bob has joined the chat");

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_text_is_relayed_to_others_only() {
    let server = TestServer::start().await;

    let mut alice = TestClient::connect(server.addr, "alice").await;
    server.wait_for_registered(1).await;
    let mut bob = TestClient::connect(server.addr, "bob").await;
    alice.recv_kind(MessageType::Join).await;
    let mut carol = TestClient::connect(server.addr, "carol").await;
    server.wait_for_registered(3).await;
    alice.recv_kind(MessageType::Join).await;
    bob.recv_kind(MessageType::Join).await;

    alice.send_text("hello everyone").await;

    for client in [&mut bob, &mut carol] {
        let msg = client.recv_kind(MessageType::Text).await;
        assert_eq!(msg.sender, "alice");
        assert_eq!(msg.payload, "hello everyone");
    }

    // The sender's own next record is its status reply, not an echo.
    alice.send_status().await;
    let reply = alice.recv().await;
    assert_eq!(reply.sender, SERVER_SENDER);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_status_reply_contains_statistics() {
    let server = TestServer::start().await;

    let mut alice = TestClient::connect(server.addr, "alice").await;
    server.wait_for_registered(1).await;
    alice.send_text("one").await;
    alice.send_status().await;

    let reply = alice.recv_kind(MessageType::Text).await;
    assert_eq!(reply.sender, SERVER_SENDER);
    assert!(reply.payload.contains("=== SERVER STATISTICS ==="));
    assert!(reply.payload.contains("Messages Received: 2"));
    assert!(reply.payload.contains("Active Clients:    1"));
    // The requester's own session occupies a worker while it is served.
    assert!(reply.payload.contains("Active Workers:    1"));
    assert!(reply.payload.contains("Cache Size:"));

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_leave_notice_on_disconnect() {
    let server = TestServer::start().await;

    let mut alice = TestClient::connect(server.addr, "alice").await;
    server.wait_for_registered(1).await;
    let bob = TestClient::connect(server.addr, "bob").await;
    alice.recv_kind(MessageType::Join).await;

    drop(bob);
    let notice = alice.recv_kind(MessageType::Leave).await;
    assert_eq!(notice.payload, "bob has left the chat");
    server.wait_for_registered(1).await;
    assert!(!server.state.coordinator.roster().is_empty());

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_record_in_handshake_packet_is_not_lost() {
    let server = TestServer::start().await;

    let mut alice = TestClient::connect(server.addr, "alice").await;
    server.wait_for_registered(1).await;

    let mut packet = b"eve\0".to_vec();
    packet.extend_from_slice(&encode_record(WireMessage::new(
        MessageType::Text,
        "eve",
        "first words",
        unix_timestamp(),
    )));
    let _eve = TestClient::connect_raw(server.addr, "eve", &packet).await;

    let msg = alice.recv_kind(MessageType::Text).await;
    assert_eq!(msg.sender, "eve");
    assert_eq!(msg.payload, "first words");

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unknown_record_type_is_discarded() {
    let server = TestServer::start().await;

    let mut alice = TestClient::connect(server.addr, "alice").await;
    server.wait_for_registered(1).await;
    let mut bob = TestClient::connect(server.addr, "bob").await;
    alice.recv_kind(MessageType::Join).await;

    bob.send(WireMessage::new(MessageType::Unknown(0x7f), "bob", "??", 0))
        .await;
    bob.send(WireMessage::new(MessageType::Audio, "bob", "noise", 0))
        .await;
    alice.expect_silence(Duration::from_millis(200)).await;

    // The session is still alive afterwards.
    bob.send_text("still here").await;
    assert_eq!(alice.recv().await.payload, "still here");
    assert_eq!(server.registered(), 2);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_relayed_messages_are_cached() {
    let server = TestServer::start().await;

    let mut alice = TestClient::connect(server.addr, "alice").await;
    server.wait_for_registered(1).await;
    alice.send_text("cache me").await;

    let cache = server.state.coordinator.cache().clone();
    wait_until(|| cache.len() >= 1).await;
    assert!(cache.len() <= cache.capacity());

    server.stop().await;
}
