// tests/integration/admission_test.rs

use super::test_helpers::{TestClient, TestServer, test_config, wait_until};
use chatrelay::config::Config;
use chatrelay::core::protocol::MessageType;

fn single_worker_config() -> Config {
    Config {
        pool_size: 1,
        ..test_config()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_empty_username_is_rejected() {
    let server = TestServer::start().await;

    let mut nobody = TestClient::connect_raw(server.addr, "", b"\0").await;
    nobody.expect_closed().await;
    assert_eq!(server.registered(), 0);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlong_username_is_rejected() {
    let server = TestServer::start().await;

    let name = "n".repeat(64);
    let mut client = TestClient::connect(server.addr, &name).await;
    client.expect_closed().await;
    assert_eq!(server.registered(), 0);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_silent_client_times_out_handshake() {
    let server = TestServer::start().await;

    let mut silent = TestClient::connect_raw(server.addr, "silent", b"").await;
    silent.expect_closed().await;
    assert_eq!(server.registered(), 0);

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_bounds_active_sessions() {
    let server = TestServer::with_config(single_worker_config()).await;

    let alice = TestClient::connect(server.addr, "alice").await;
    server.wait_for_registered(1).await;

    let mut bob = TestClient::connect(server.addr, "bob").await;
    let pending = &server.state.pending_admissions;
    wait_until(|| pending.len() == 1).await;
    assert_eq!(server.registered(), 1);
    let members = server.state.coordinator.roster().snapshot().members;
    assert!(!members.iter().any(|m| m.user_id == "bob"));

    // Freeing the only worker admits the queued session.
    drop(alice);
    wait_until(|| pending.is_empty()).await;
    server.wait_for_registered(1).await;
    let members = server.state.coordinator.roster().snapshot().members;
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].user_id, "bob");

    bob.send_status().await;
    let reply = bob.recv_kind(MessageType::Text).await;
    assert!(reply.payload.contains("Active Clients:    1"));

    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_queued_sessions_are_served_in_order() {
    let server = TestServer::with_config(single_worker_config()).await;

    let first = TestClient::connect(server.addr, "first").await;
    server.wait_for_registered(1).await;

    let second = TestClient::connect(server.addr, "second").await;
    let pending = &server.state.pending_admissions;
    wait_until(|| pending.len() == 1).await;
    let _third = TestClient::connect(server.addr, "third").await;
    wait_until(|| pending.len() == 2).await;

    drop(first);
    wait_until(|| pending.len() == 1).await;
    server.wait_for_registered(1).await;
    let members = server.state.coordinator.roster().snapshot().members;
    assert_eq!(members[0].user_id, "second");

    drop(second);
    wait_until(|| pending.is_empty()).await;
    server.wait_for_registered(1).await;
    let members = server.state.coordinator.roster().snapshot().members;
    assert_eq!(members[0].user_id, "third");

    server.stop().await;
}
