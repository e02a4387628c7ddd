// src/connection/handler.rs

//! Defines the `ConnectionHandler` which manages the full lifecycle of a client
//! session, from admission through deregistration.

use super::guard::ConnectionGuard;
use super::session::{SessionPhase, SessionState};
use crate::core::protocol::wire_message::truncate_on_char_boundary;
use crate::core::protocol::{MessageType, WireMessage, WireMessageCodec, read_identity};
use crate::core::state::{ClientRecord, ServerState, ShutdownSender};
use crate::core::ChatRelayError;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

/// Manages the full lifecycle of one client session. One handler runs per pool
/// worker for as long as the client stays connected.
pub struct ConnectionHandler {
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<ServerState>,
    session: SessionState,
}

impl ConnectionHandler {
    /// Creates a handler for a connection that has been accepted and queued.
    pub fn new(stream: TcpStream, addr: SocketAddr, state: Arc<ServerState>, connection_id: u64) -> Self {
        Self {
            stream,
            addr,
            state,
            session: SessionState::new(connection_id),
        }
    }

    /// Runs the session to completion. Transport and protocol problems end the
    /// session quietly; only lifecycle violations surface as errors.
    pub async fn run(mut self) -> Result<(), ChatRelayError> {
        let connection_id = self.session.connection_id;
        self.state.pending_admissions.remove(&connection_id);

        // Subscribe before checking the flag so a shutdown cannot slip between them.
        let mut global_shutdown_rx = self.state.shutdown_tx.subscribe();
        if self.state.is_shutting_down() {
            info!(
                "Closing queued connection {} from {}: server is shutting down.",
                connection_id, self.addr
            );
            self.transition(SessionPhase::Deregistered)?;
            return Ok(());
        }
        self.transition(SessionPhase::Admitted)?;

        let config = &self.state.config;
        let handshake = match read_identity(
            &mut self.stream,
            config.max_username_len,
            config.read_timeout(),
        )
        .await
        {
            Ok(handshake) => handshake,
            Err(e) => {
                warn!("Invalid user ID received from {}, disconnecting: {}", self.addr, e);
                self.transition(SessionPhase::Deregistered)?;
                return Ok(());
            }
        };
        let user_id = handshake.user_id;
        self.session.user_id = Some(user_id.clone());

        let ConnectionHandler {
            stream,
            addr,
            state,
            mut session,
        } = self;

        let (read_half, write_half) = stream.into_split();
        let mut reader = FramedRead::new(read_half, WireMessageCodec);
        reader.read_buffer_mut().extend_from_slice(&handshake.leftover);

        let (outbound_tx, outbound_rx) = mpsc::channel(state.config.outbound_queue_len);
        let (kill_tx, mut kill_rx) = broadcast::channel(1);
        let writer = tokio::spawn(write_loop(
            outbound_rx,
            FramedWrite::new(write_half, WireMessageCodec),
            kill_tx.clone(),
            connection_id,
        ));

        state.coordinator.join(ClientRecord::new(
            connection_id,
            user_id.clone(),
            Some(addr),
            outbound_tx,
            kill_tx,
        ));
        let guard = ConnectionGuard::new(state.clone(), connection_id, user_id.clone());
        advance(&mut session, SessionPhase::Registered)?;
        info!("Client connected: {} (conn: {}, addr: {})", user_id, connection_id, addr);
        advance(&mut session, SessionPhase::Active)?;

        let read_timeout = state.config.read_timeout();
        loop {
            tokio::select! {
                // Prioritize shutdown signals over inbound traffic.
                biased;
                _ = global_shutdown_rx.recv() => {
                    info!("Session {} received global shutdown signal.", connection_id);
                    break;
                }
                _ = kill_rx.recv() => {
                    info!("Session {} received kill signal.", connection_id);
                    break;
                }
                res = tokio::time::timeout(read_timeout, reader.next()) => {
                    match res {
                        // Read timeout: a chance to notice a shutdown that raced the channel.
                        Err(_) => {
                            if state.is_shutting_down() {
                                break;
                            }
                        }
                        Ok(Some(Ok(msg))) => process_message(&state, connection_id, &user_id, msg),
                        Ok(Some(Err(ChatRelayError::Protocol(reason)))) => {
                            debug!("Session {}: discarding malformed record: {}", connection_id, reason);
                        }
                        Ok(Some(Err(e))) => {
                            if is_normal_disconnect(&e) {
                                debug!("Connection from {} closed by peer: {}", addr, e);
                            } else {
                                warn!("Connection error for {}: {}", addr, e);
                            }
                            break;
                        }
                        Ok(None) => {
                            debug!("Connection from {} closed by peer.", addr);
                            break;
                        }
                    }
                }
            }
        }

        advance(&mut session, SessionPhase::Disconnecting)?;
        drop(guard);
        advance(&mut session, SessionPhase::Deregistered)?;

        // The registry held the only sender; with the record gone the writer drains
        // what is left and closes the socket.
        if tokio::time::timeout(read_timeout, writer).await.is_err() {
            debug!("Writer for session {} did not finish in time.", connection_id);
        }
        Ok(())
    }

    fn transition(&mut self, next: SessionPhase) -> Result<(), ChatRelayError> {
        advance(&mut self.session, next)
    }
}

fn advance(session: &mut SessionState, next: SessionPhase) -> Result<(), ChatRelayError> {
    let from = session.phase();
    session
        .advance(next)
        .map_err(|e| ChatRelayError::Internal(e.to_string()))?;
    debug!("Session {}: {} -> {}", session.connection_id, from, next);
    Ok(())
}

/// Dispatches one decoded record from a registered session.
fn process_message(state: &ServerState, connection_id: u64, user_id: &str, mut msg: WireMessage) {
    let coordinator = &state.coordinator;
    coordinator.record_received(connection_id);

    match msg.kind {
        MessageType::Text => {
            let limit = state.config.max_payload_len;
            if msg.payload.len() > limit {
                let truncated = truncate_on_char_boundary(&msg.payload, limit).to_string();
                msg.set_payload(&truncated);
            }
            coordinator.relay_text(connection_id, user_id, msg);
        }
        MessageType::Status => {
            if coordinator.reply_status(connection_id) {
                info!("Statistics sent to {}", user_id);
            } else {
                warn!("Failed to send statistics to {}", user_id);
            }
            coordinator.log_stats();
            debug!("{}", coordinator.roster().snapshot());
        }
        other => {
            warn!("Unknown message type {} from {}", other.as_u8(), user_id);
        }
    }
}

/// Drains a client's delivery queue into its socket.
async fn write_loop(
    mut rx: mpsc::Receiver<WireMessage>,
    mut sink: FramedWrite<OwnedWriteHalf, WireMessageCodec>,
    kill_switch: ShutdownSender,
    connection_id: u64,
) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = sink.send(msg).await {
            debug!("Session {}: write failed: {}", connection_id, e);
            // The socket is unusable; end the session instead of waiting for a read error.
            let _ = kill_switch.send(());
            return;
        }
    }
    let _ = sink.close().await;
}

fn is_normal_disconnect(e: &ChatRelayError) -> bool {
    matches!(e, ChatRelayError::Io(arc_err) if matches!(
        arc_err.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionAborted
    ))
}
