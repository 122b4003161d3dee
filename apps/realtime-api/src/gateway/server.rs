//! WebSocket upgrade handler and per-connection event loop.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use praseodym_common::RoomId;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

use crate::AppState;

use super::events::{ClientEvent, HandshakeFrame};
use super::handler::{dispatch, handle_handshake};
use super::registry::RegistryError;
use super::session::{ConnectionContext, ConnectionId, Frame};
use super::Gateway;

/// Close codes (4000-range for application-level).
pub const CLOSE_AUTH_FAILED: u16 = 4004;
pub const CLOSE_HANDSHAKE_TIMEOUT: u16 = 4009;
pub const CLOSE_IDLE_TIMEOUT: u16 = 4010;
const CLOSE_GOING_AWAY: u16 = 1001;

/// Lower bound on the keep-alive period; `interval` rejects zero.
const MIN_PING_INTERVAL: Duration = Duration::from_millis(10);

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

pub fn router() -> Router<AppState> {
    Router::new().route("/socket", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Step 1: the auth frame, within the handshake timeout.
    let handshake = match time::timeout(state.config.handshake_timeout, read_handshake(&mut ws_rx)).await {
        Ok(Some(frame)) => frame,
        Ok(None) => return,
        Err(_timeout) => {
            let _ = send_close(&mut ws_tx, CLOSE_HANDSHAKE_TIMEOUT, "Handshake timeout").await;
            return;
        }
    };

    // Step 2: authenticate. Nothing is registered until this succeeds.
    let user = match handle_handshake(&state.authenticator, &handshake).await {
        Ok(user) => user,
        Err(e) => {
            tracing::debug!(error = %e, "connection refused");
            let _ = send_close(&mut ws_tx, CLOSE_AUTH_FAILED, e.reason()).await;
            return;
        }
    };

    // Step 3: admit.
    let gateway = state.gateway.clone();
    let (outbound, outbound_rx) = gateway.open_outbound();
    let ctx = match gateway.admit(user, outbound) {
        Ok(ctx) => ctx,
        Err(RegistryError::Closed) => {
            let _ = send_close(&mut ws_tx, CLOSE_GOING_AWAY, "Server shutting down").await;
            return;
        }
        Err(e) => {
            if cfg!(debug_assertions) {
                panic!("admission failed: {e}");
            }
            tracing::warn!(error = %e, "admission failed, closing connection");
            return;
        }
    };
    let admitted = AdmittedConnection {
        gateway: gateway.clone(),
        connection_id: ctx.connection_id.clone(),
    };

    tracing::info!(
        connection_id = %ctx.connection_id,
        user_id = %ctx.user_id(),
        "realtime connection established"
    );

    run_connection(&state, &ctx, ws_tx, ws_rx, outbound_rx).await;

    let rooms = admitted.close();

    tracing::info!(
        connection_id = %ctx.connection_id,
        user_id = %ctx.user_id(),
        rooms = rooms.len(),
        "realtime connection ended"
    );
}

/// Read until the first text frame and parse it as the handshake. Returns
/// `None` if the socket closes first. An unparseable frame is treated as a
/// handshake without a credential.
async fn read_handshake(ws_rx: &mut WsStream) -> Option<HandshakeFrame> {
    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                return Some(serde_json::from_str(&text).unwrap_or_default());
            }
            Ok(Message::Close(_)) => return None,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(?e, "ws read error during handshake");
                return None;
            }
        }
    }
    None
}

/// Main connection loop: read client events, forward queued frames, enforce liveness.
async fn run_connection(
    state: &AppState,
    ctx: &ConnectionContext,
    mut ws_tx: WsSink,
    mut ws_rx: WsStream,
    mut outbound_rx: mpsc::Receiver<Frame>,
) {
    let gateway = &state.gateway;
    let idle_timeout = state.config.idle_timeout;
    let mut ping_timer = time::interval(state.config.ping_interval.max(MIN_PING_INTERVAL));
    ping_timer.tick().await; // First tick fires immediately; skip it.
    let mut last_inbound = Instant::now();

    loop {
        tokio::select! {
            // Client sends us a frame.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        last_inbound = Instant::now();
                        gateway.touch(&ctx.connection_id);
                        match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => dispatch(gateway, ctx, event),
                            Err(e) => {
                                tracing::debug!(
                                    connection_id = %ctx.connection_id,
                                    error = %e,
                                    "ignoring unrecognized client frame"
                                );
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        last_inbound = Instant::now();
                        gateway.touch(&ctx.connection_id);
                    }
                    Some(Err(e)) => {
                        tracing::debug!(?e, connection_id = %ctx.connection_id, "ws read error");
                        break;
                    }
                }
            }

            // Frame queued by the broadcaster. `None` means we were evicted.
            frame = outbound_rx.recv() => {
                let Some(frame) = frame else {
                    let _ = send_close(&mut ws_tx, CLOSE_GOING_AWAY, "Server shutting down").await;
                    break;
                };
                if ws_tx.send(Message::Text(frame.as_ref().into())).await.is_err() {
                    break;
                }
            }

            // Keep-alive and idle detection.
            _ = ping_timer.tick() => {
                if last_inbound.elapsed() > idle_timeout {
                    tracing::debug!(connection_id = %ctx.connection_id, "idle timeout, closing connection");
                    let _ = send_close(&mut ws_tx, CLOSE_IDLE_TIMEOUT, "Idle timeout").await;
                    break;
                }
                if ws_tx.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Evicts its connection when dropped, so the registry is cleaned up even if
/// the connection task unwinds. Eviction is idempotent.
struct AdmittedConnection {
    gateway: Arc<Gateway>,
    connection_id: ConnectionId,
}

impl AdmittedConnection {
    fn close(self) -> HashSet<RoomId> {
        self.gateway.evict(&self.connection_id)
    }
}

impl Drop for AdmittedConnection {
    fn drop(&mut self) {
        self.gateway.evict(&self.connection_id);
    }
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(ws_tx: &mut WsSink, code: u16, reason: &str) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }));
    ws_tx.send(close_msg).await
}
