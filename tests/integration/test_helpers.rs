// tests/integration/test_helpers.rs

//! Test helpers and utilities for integration tests

use bytes::BytesMut;
use chatrelay::config::Config;
use chatrelay::core::protocol::{MessageType, WireMessage, WireMessageCodec};
use chatrelay::core::state::ServerState;
use chatrelay::core::unix_timestamp;
use chatrelay::server;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::codec::{Encoder, FramedRead, FramedWrite};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// A configuration suited to tests: loopback, ephemeral port, short timeouts.
pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        read_timeout_ms: 200,
        ..Config::default()
    }
}

/// A running server bound to an ephemeral loopback port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<ServerState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Starts a server with the default test configuration.
    pub async fn start() -> Self {
        Self::with_config(test_config()).await
    }

    /// Starts a server with a custom configuration.
    pub async fn with_config(config: Config) -> Self {
        // Initialize tracing (ignore error if already initialized)
        let _ = tracing_subscriber::registry()
            .with(EnvFilter::new("warn"))
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();

        let ctx = server::setup(config)
            .await
            .expect("Failed to set up server");
        let addr = ctx.listener.local_addr().expect("listener address");
        let state = ctx.state.clone();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(server::serve(ctx, async move {
            let _ = shutdown_rx.await;
        }));

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
            handle,
        }
    }

    /// Triggers graceful shutdown and waits for it to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        tokio::time::timeout(Duration::from_secs(10), &mut self.handle)
            .await
            .expect("server did not shut down in time")
            .expect("server task panicked");
    }

    pub fn registered(&self) -> usize {
        self.state.coordinator.registry().len()
    }

    /// Waits until exactly `n` clients are registered.
    pub async fn wait_for_registered(&self, n: usize) {
        wait_until(|| self.registered() == n).await;
    }
}

/// A framed chat client speaking the relay's wire protocol.
pub struct TestClient {
    pub user_id: String,
    reader: FramedRead<OwnedReadHalf, WireMessageCodec>,
    writer: FramedWrite<OwnedWriteHalf, WireMessageCodec>,
}

impl TestClient {
    /// Connects and performs the identity handshake.
    pub async fn connect(addr: SocketAddr, user_id: &str) -> Self {
        let mut handshake = user_id.as_bytes().to_vec();
        handshake.push(0);
        Self::connect_raw(addr, user_id, &handshake).await
    }

    /// Connects and sends `handshake` verbatim as the first bytes.
    pub async fn connect_raw(addr: SocketAddr, user_id: &str, handshake: &[u8]) -> Self {
        let mut stream = TcpStream::connect(addr).await.expect("connect");
        stream.write_all(handshake).await.expect("send handshake");
        let (read_half, write_half) = stream.into_split();
        Self {
            user_id: user_id.to_string(),
            reader: FramedRead::new(read_half, WireMessageCodec),
            writer: FramedWrite::new(write_half, WireMessageCodec),
        }
    }

    pub async fn send(&mut self, msg: WireMessage) {
        self.writer.send(msg).await.expect("send record");
    }

    pub async fn send_text(&mut self, payload: &str) {
        let msg = WireMessage::new(MessageType::Text, &self.user_id, payload, unix_timestamp());
        self.send(msg).await;
    }

    pub async fn send_status(&mut self) {
        let msg = WireMessage::new(MessageType::Status, &self.user_id, "", unix_timestamp());
        self.send(msg).await;
    }

    /// Receives the next record, failing the test on timeout or closure.
    pub async fn recv(&mut self) -> WireMessage {
        tokio::time::timeout(IO_TIMEOUT, self.reader.next())
            .await
            .expect("timed out waiting for a record")
            .expect("connection closed")
            .expect("decode error")
    }

    /// Receives records until one of `kind` arrives.
    pub async fn recv_kind(&mut self, kind: MessageType) -> WireMessage {
        loop {
            let msg = self.recv().await;
            if msg.kind == kind {
                return msg;
            }
        }
    }

    /// Asserts that nothing arrives within `window`.
    pub async fn expect_silence(&mut self, window: Duration) {
        if let Ok(Some(Ok(msg))) = tokio::time::timeout(window, self.reader.next()).await {
            panic!("unexpected record: {msg:?}");
        }
    }

    /// Waits for the server to close the connection, skipping any records still
    /// in flight.
    pub async fn expect_closed(&mut self) {
        let closed = tokio::time::timeout(IO_TIMEOUT, async {
            while let Some(Ok(_)) = self.reader.next().await {}
        })
        .await;
        assert!(closed.is_ok(), "connection was not closed by the server");
    }
}

/// Encodes a record to raw bytes, for tests that hand-craft packets.
pub fn encode_record(msg: WireMessage) -> BytesMut {
    let mut buf = BytesMut::new();
    WireMessageCodec.encode(msg, &mut buf).expect("encode");
    buf
}

/// Polls `cond` until it holds or a generous deadline passes.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + IO_TIMEOUT;
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
