//! Per-connection handler: handshake, resume, and message routing.
//!
//! Each accepted connection gets its own task running this handler:
//!
//!   1. Receive Handshake → validate version
//!   2. Authenticate (or resume with a reconnection token) → PlayerId
//!   3. Send HandshakeAck with a fresh (or preserved) reconnect token
//!   4. Select loop: socket frames in, room events out
//!
//! The handler owns the outbound pump: the player's room posts
//! [`RoomEvent`]s onto an unbounded channel and this task serializes
//! them to the socket in order. A drop guard reports the disconnect to
//! the session layer and the player's room even if the handler dies.

use std::sync::Arc;
use std::time::Duration;

use quizforge_lobby::LobbyError;
use quizforge_protocol::{
    ClientCommand, Codec, Envelope, Payload, PlayerId, RoomEvent, SystemMessage,
};
use quizforge_session::Authenticator;
use tokio::sync::mpsc;

use crate::server::{ServerState, PROTOCOL_VERSION};
use crate::ws::{WsConnection, WsReader, WsWriter};
use crate::QuizforgeError;

/// The client must complete the handshake within this window.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// With heartbeats every ~5 seconds, a silent socket this long is dead.
const RECV_TIMEOUT: Duration = Duration::from_secs(15);

/// Drop guard that reports the disconnect when the handler exits, even
/// on panic. `Drop` is synchronous, so the async work is spawned.
struct SessionGuard<A: Authenticator, C: Codec> {
    player_id: PlayerId,
    state: Arc<ServerState<A, C>>,
}

impl<A: Authenticator, C: Codec> Drop for SessionGuard<A, C> {
    fn drop(&mut self) {
        let player_id = self.player_id;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            {
                let mut sessions = state.sessions.lock().await;
                let _ = sessions.disconnect(player_id);
            }
            let registry = state.registry.lock().await;
            if registry.room_of(&player_id).is_some() {
                let _ = registry.dropped(player_id).await;
            }
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, C>(
    conn: WsConnection,
    state: Arc<ServerState<A, C>>,
) -> Result<(), QuizforgeError>
where
    A: Authenticator,
    C: Codec,
{
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    let (mut writer, mut reader) = conn.split();

    let (player_id, reconnect_token, resumed) =
        perform_handshake(&mut writer, &mut reader, &state).await?;
    tracing::info!(%conn_id, %player_id, resumed, "player authenticated");

    // Guard before the ack: if the ack send fails, the drop still
    // reports the disconnect and the session does not leak.
    let _guard = SessionGuard { player_id, state: Arc::clone(&state) };
    send_ack(&mut writer, &state, player_id, reconnect_token).await?;

    // The outbound pump: the player's room delivers events here.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<RoomEvent>();

    // A resumed session picks its room membership back up on the new
    // socket; the room answers with targeted restore events.
    if resumed {
        let registry = state.registry.lock().await;
        if registry.room_of(&player_id).is_some() {
            if let Err(e) = registry.resumed(player_id, event_tx.clone()).await {
                tracing::debug!(%player_id, error = %e, "room resume failed");
            }
        }
    }

    let mut seq: u64 = 1;

    loop {
        tokio::select! {
            maybe_event = event_rx.recv() => {
                // The handler keeps one sender alive, so this is always
                // Some while the loop runs.
                if let Some(event) = maybe_event {
                    send_event(&mut writer, &state, &mut seq, &event).await?;
                }
            }

            result = tokio::time::timeout(RECV_TIMEOUT, reader.recv()) => {
                let data = match result {
                    Ok(Ok(Some(data))) => data,
                    Ok(Ok(None)) => {
                        tracing::info!(%player_id, "connection closed cleanly");
                        break;
                    }
                    Ok(Err(e)) => {
                        tracing::debug!(%player_id, error = %e, "recv error");
                        break;
                    }
                    Err(_) => {
                        tracing::info!(%player_id, "connection timed out");
                        break;
                    }
                };

                let envelope: Envelope = match state.codec.decode(&data) {
                    Ok(env) => env,
                    Err(e) => {
                        tracing::debug!(%player_id, error = %e, "failed to decode envelope");
                        continue;
                    }
                };

                match envelope.payload {
                    Payload::System(msg) => {
                        let should_close = handle_system_message(
                            &mut writer, &state, player_id, &event_tx, msg, &mut seq,
                        )
                        .await?;
                        if should_close {
                            break;
                        }
                    }
                    Payload::Game(bytes) => {
                        handle_game_message(
                            &mut writer, &state, player_id, bytes, &mut seq,
                        )
                        .await?;
                    }
                }
            }
        }
    }

    // _guard drops here → session disconnect and room notification fire.
    Ok(())
}

/// Performs the initial handshake: receive Handshake, validate the
/// version, authenticate or resume. Returns the identity and the
/// reconnect token the caller acks with.
async fn perform_handshake<A, C>(
    writer: &mut WsWriter,
    reader: &mut WsReader,
    state: &Arc<ServerState<A, C>>,
) -> Result<(PlayerId, String, bool), QuizforgeError>
where
    A: Authenticator,
    C: Codec,
{
    let data = match tokio::time::timeout(HANDSHAKE_TIMEOUT, reader.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(invalid("connection closed before handshake"));
        }
        Ok(Err(e)) => return Err(QuizforgeError::Transport(e)),
        Err(_) => return Err(invalid("handshake timed out")),
    };

    let envelope: Envelope = state.codec.decode(&data)?;
    let (version, token, resume) = match envelope.payload {
        Payload::System(SystemMessage::Handshake { version, token, resume }) => {
            (version, token, resume)
        }
        _ => {
            send_error(writer, state, 400, "expected Handshake", 0).await?;
            return Err(invalid("first message must be Handshake"));
        }
    };

    if version != PROTOCOL_VERSION {
        send_error(
            writer,
            state,
            400,
            &format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}"),
            0,
        )
        .await?;
        return Err(invalid("protocol version mismatch"));
    }

    // A resume token takes precedence: the client is trying to pick an
    // existing session back up inside the grace period.
    if let Some(resume_token) = resume {
        let mut sessions = state.sessions.lock().await;
        match sessions.reconnect(&resume_token) {
            Ok(session) => {
                let player_id = session.player_id;
                let reconnect_token = session.reconnect_token.clone();
                return Ok((player_id, reconnect_token, true));
            }
            Err(e) => {
                drop(sessions);
                send_error(writer, state, 401, "resume rejected", 0).await?;
                return Err(QuizforgeError::Session(e));
            }
        }
    }

    let token_str = token.as_deref().unwrap_or("");
    let player_id = match state.auth.authenticate(token_str).await {
        Ok(pid) => pid,
        Err(e) => {
            send_error(writer, state, 401, "unauthorized", 0).await?;
            return Err(QuizforgeError::Session(e));
        }
    };

    let reconnect_token = {
        let mut sessions = state.sessions.lock().await;
        match sessions.create(player_id, format!("player-{}", player_id.0)) {
            Ok(session) => session.reconnect_token.clone(),
            Err(e) => {
                drop(sessions);
                send_error(writer, state, 409, "already connected", 0).await?;
                return Err(QuizforgeError::Session(e));
            }
        }
    };

    Ok((player_id, reconnect_token, false))
}

/// Handles a system message. Returns `true` if the connection should
/// close.
async fn handle_system_message<A, C>(
    writer: &mut WsWriter,
    state: &Arc<ServerState<A, C>>,
    player_id: PlayerId,
    event_tx: &mpsc::UnboundedSender<RoomEvent>,
    msg: SystemMessage,
    seq: &mut u64,
) -> Result<bool, QuizforgeError>
where
    A: Authenticator,
    C: Codec,
{
    match msg {
        SystemMessage::Heartbeat { client_time } => {
            state.sessions.lock().await.touch(player_id);
            let ack = SystemMessage::HeartbeatAck {
                client_time,
                server_time: state.now_millis(),
            };
            send_system(writer, state, next_seq(seq), ack).await?;
        }

        SystemMessage::JoinRoom { room_id, display_name } => {
            state
                .sessions
                .lock()
                .await
                .set_display_name(player_id, &display_name);

            let join_result = {
                let mut registry = state.registry.lock().await;
                registry
                    .join(player_id, room_id, display_name, event_tx.clone())
                    .await
            };

            match join_result {
                Ok(()) => {
                    send_system(
                        writer,
                        state,
                        next_seq(seq),
                        SystemMessage::RoomJoined { room_id },
                    )
                    .await?;
                }
                Err(e) => {
                    let code = match &e {
                        LobbyError::RoomFull(_) | LobbyError::AlreadyInRoom(..) => 409,
                        _ => 400,
                    };
                    send_error(writer, state, code, &e.to_string(), next_seq(seq)).await?;
                }
            }
        }

        SystemMessage::LeaveRoom => {
            let mut registry = state.registry.lock().await;
            if let Err(e) = registry.leave(player_id).await {
                tracing::debug!(%player_id, error = %e, "leave room failed");
            }
        }

        SystemMessage::Disconnect { reason } => {
            tracing::info!(%player_id, %reason, "client disconnected");
            return Ok(true);
        }

        _ => {
            tracing::debug!(%player_id, "ignoring unexpected system message");
        }
    }

    Ok(false)
}

/// Handles a game frame: decode the quiz command and route it to the
/// player's room.
async fn handle_game_message<A, C>(
    writer: &mut WsWriter,
    state: &Arc<ServerState<A, C>>,
    player_id: PlayerId,
    bytes: Vec<u8>,
    seq: &mut u64,
) -> Result<(), QuizforgeError>
where
    A: Authenticator,
    C: Codec,
{
    let command: ClientCommand = match state.codec.decode(&bytes) {
        Ok(cmd) => cmd,
        Err(e) => {
            send_error(
                writer,
                state,
                400,
                &format!("invalid command: {e}"),
                next_seq(seq),
            )
            .await?;
            return Ok(());
        }
    };

    state.sessions.lock().await.touch(player_id);

    let result = state
        .registry
        .lock()
        .await
        .command(player_id, command)
        .await;

    if let Err(e) = result {
        send_error(writer, state, 400, &e.to_string(), next_seq(seq)).await?;
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Send helpers
// ---------------------------------------------------------------------------

async fn send_ack<A: Authenticator, C: Codec>(
    writer: &mut WsWriter,
    state: &Arc<ServerState<A, C>>,
    player_id: PlayerId,
    reconnect_token: String,
) -> Result<(), QuizforgeError> {
    let ack = SystemMessage::HandshakeAck {
        player_id,
        reconnect_token,
        server_time: state.now_millis(),
    };
    send_system(writer, state, 0, ack).await
}

async fn send_system<A: Authenticator, C: Codec>(
    writer: &mut WsWriter,
    state: &Arc<ServerState<A, C>>,
    seq: u64,
    msg: SystemMessage,
) -> Result<(), QuizforgeError> {
    let envelope = Envelope {
        seq,
        timestamp: state.now_millis(),
        payload: Payload::System(msg),
    };
    let bytes = state.codec.encode(&envelope)?;
    writer.send(bytes).await.map_err(QuizforgeError::Transport)
}

async fn send_error<A: Authenticator, C: Codec>(
    writer: &mut WsWriter,
    state: &Arc<ServerState<A, C>>,
    code: u16,
    message: &str,
    seq: u64,
) -> Result<(), QuizforgeError> {
    send_system(
        writer,
        state,
        seq,
        SystemMessage::Error { code, message: message.to_string() },
    )
    .await
}

/// Forwards one room event to the socket as a game frame.
async fn send_event<A: Authenticator, C: Codec>(
    writer: &mut WsWriter,
    state: &Arc<ServerState<A, C>>,
    seq: &mut u64,
    event: &RoomEvent,
) -> Result<(), QuizforgeError> {
    let bytes = state.codec.encode(event)?;
    let envelope = Envelope {
        seq: next_seq(seq),
        timestamp: state.now_millis(),
        payload: Payload::Game(bytes),
    };
    let frame = state.codec.encode(&envelope)?;
    writer.send(frame).await.map_err(QuizforgeError::Transport)
}

/// Increments and returns the next sequence number.
fn next_seq(seq: &mut u64) -> u64 {
    let current = *seq;
    *seq += 1;
    current
}

fn invalid(message: &str) -> QuizforgeError {
    QuizforgeError::Protocol(quizforge_protocol::ProtocolError::InvalidMessage(
        message.into(),
    ))
}
