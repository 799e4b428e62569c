//! WebSocket upgrade handler and per-connection event loop.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use carrel_common::id::ConnectionId;
use carrel_common::PrefixedId;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio::time;

use crate::AppState;

use super::events::{
    ClientMessage, EventName, GatewayMessage, HeartbeatPayload, OP_HEARTBEAT, OP_JOIN_GROUP,
    OP_LEAVE_GROUP, OP_RELEASE_SEAT, OP_SELECT_SEAT,
};
use super::fanout::BroadcastPayload;
use super::handler::{handle_action, handle_disconnect, ready_payload, HEARTBEAT_INTERVAL_MS};
use super::session::GatewaySession;

/// Close codes (4000-range for application-level).
const CLOSE_UNKNOWN_ERROR: u16 = 4000;
const CLOSE_UNKNOWN_OPCODE: u16 = 4001;
const CLOSE_DECODE_ERROR: u16 = 4002;
const CLOSE_SESSION_TIMEOUT: u16 = 4009;

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

pub fn router() -> Router<AppState> {
    Router::new().route("/gateway", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut ws_tx, ws_rx) = socket.split();
    let session = Arc::new(GatewaySession::new(ConnectionId::generate()));

    // Subscribe before READY so nothing published after it is missed.
    let broadcast_rx = state.broadcast.subscribe();

    let ready = GatewayMessage::dispatch(
        EventName::READY,
        session.next_seq(),
        ready_payload(&state, &session),
    );
    if send_message(&mut ws_tx, &ready).await.is_err() {
        return;
    }

    tracing::info!(connection_id = %session.connection_id, "gateway connection established");

    run_session(&state, session.clone(), ws_tx, ws_rx, broadcast_rx).await;

    // Abrupt or clean, a gone connection gives up its seat.
    handle_disconnect(&state, &session.connection_id);

    tracing::info!(connection_id = %session.connection_id, "gateway connection ended");
}

/// Main session event loop: read client actions, forward broadcasts, enforce heartbeat.
async fn run_session(
    state: &AppState,
    session: Arc<GatewaySession>,
    mut ws_tx: WsSink,
    mut ws_rx: WsStream,
    mut broadcast_rx: broadcast::Receiver<Arc<BroadcastPayload>>,
) {
    // Heartbeat deadline: client must heartbeat within 1.5× the interval.
    let heartbeat_deadline = Duration::from_millis(HEARTBEAT_INTERVAL_MS * 3 / 2);
    let mut heartbeat_timer = time::interval(heartbeat_deadline);
    heartbeat_timer.tick().await; // First tick fires immediately; skip it.
    let mut got_heartbeat = true;

    loop {
        tokio::select! {
            // Client sends us a message.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let client_msg: ClientMessage = match serde_json::from_str(&text) {
                            Ok(m) => m,
                            Err(_) => {
                                let _ = send_close(&mut ws_tx, CLOSE_UNKNOWN_ERROR, "Invalid JSON").await;
                                break;
                            }
                        };

                        match client_msg.op {
                            OP_HEARTBEAT => {
                                got_heartbeat = true;
                                let payload: HeartbeatPayload =
                                    serde_json::from_value(client_msg.d).unwrap_or(HeartbeatPayload { seq: 0 });
                                let ack = GatewayMessage::heartbeat_ack(payload.seq);
                                if send_message(&mut ws_tx, &ack).await.is_err() {
                                    break;
                                }
                            }
                            op @ (OP_JOIN_GROUP | OP_LEAVE_GROUP | OP_SELECT_SEAT | OP_RELEASE_SEAT) => {
                                match handle_action(state, &session, op, client_msg.d) {
                                    Ok(Some(reply)) => {
                                        let msg = GatewayMessage::dispatch(reply.event_name, session.next_seq(), reply.data);
                                        if send_message(&mut ws_tx, &msg).await.is_err() {
                                            break;
                                        }
                                    }
                                    Ok(None) => {}
                                    Err(reason) => {
                                        tracing::debug!(connection_id = %session.connection_id, op, %reason, "rejected client action");
                                        let _ = send_close(&mut ws_tx, CLOSE_DECODE_ERROR, reason).await;
                                        break;
                                    }
                                }
                            }
                            _ => {
                                let _ = send_close(&mut ws_tx, CLOSE_UNKNOWN_OPCODE, "Unknown opcode").await;
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, connection_id = %session.connection_id, "ws read error");
                        break;
                    }
                    _ => continue,
                }
            }

            // Broadcast event from the fanout hub.
            result = broadcast_rx.recv() => {
                match result {
                    Ok(payload) => {
                        if !session.is_subscribed(&payload.group) {
                            continue;
                        }

                        let msg = GatewayMessage::dispatch(&payload.event_name, session.next_seq(), payload.data.clone());
                        if send_message(&mut ws_tx, &msg).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(
                            connection_id = %session.connection_id,
                            skipped = n,
                            "gateway session lagged behind broadcast"
                        );
                        // Missed events are dropped; keep serving.
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }

            // Heartbeat timeout check.
            _ = heartbeat_timer.tick() => {
                if !got_heartbeat {
                    tracing::debug!(
                        connection_id = %session.connection_id,
                        "heartbeat timeout, closing connection"
                    );
                    let _ = send_close(&mut ws_tx, CLOSE_SESSION_TIMEOUT, "Heartbeat timeout").await;
                    break;
                }
                got_heartbeat = false;
            }
        }
    }
}

/// Serialize and send one gateway message as a text frame.
async fn send_message(ws_tx: &mut WsSink, msg: &GatewayMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    ws_tx.send(Message::Text(json.into())).await
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(ws_tx: &mut WsSink, code: u16, reason: &str) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(axum::extract::ws::CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
