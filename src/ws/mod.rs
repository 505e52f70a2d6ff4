//! WebSocket transport for chat sessions.
//!
//! ## Connection lifecycle
//!
//! 1. Client connects to `GET /ws?token=<jwt>` — the origin allowlist and the
//!    token are checked before the upgrade completes. A rejected handshake
//!    never creates a session and never upgrades the transport.
//! 2. All frames are JSON objects tagged by a `"type"` field (see
//!    [`crate::events`] for the closed set of types).
//! 3. Events for one connection are processed strictly in arrival order; the
//!    only suspended work is the scheduled reply, which runs off-loop and is
//!    cancellable at any point.
//! 4. On disconnect the session is torn down: the pending reply (if any) is
//!    cancelled without emitting anything and room membership is released.
//!
//! ## Message flow (happy path)
//!
//! | Client sends | Server emits (to the bound room) |
//! |---|---|
//! | `authenticate` `{userId}` | — |
//! | `message` `{text, ...}` | `ai:typing` true, `message:sent`, then after the reply delay `ai:typing` false, `message:received` |
//! | `cancel:response` | `ai:typing` false (pending reply suppressed) |
//!
//! Errors (`error` events) always go to the originating connection only.
//!
//! Outgoing frames are funneled through an mpsc channel so the reply task and
//! room publishers can emit without holding a reference to the socket. The
//! same channel's sender is what gets registered in the room registry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::auth::{self, AuthError, Claims};
use crate::events::{ClientEvent, ServerEvent};
use crate::session::Session;
use crate::state::AppState;
use crate::util::now_ms;

/// Query parameters for the WebSocket upgrade request.
#[derive(Deserialize)]
pub struct WsQuery {
    /// Bearer token passed as a query parameter (browsers can't set headers
    /// on WebSocket upgrades).
    pub token: Option<String>,
}

/// `GET /ws?token=<jwt>` — connection gate and upgrade handler.
///
/// Runs exactly once per connection attempt, before any session state
/// exists. Disallowed origins get `403 Forbidden`; a missing credential gets
/// `401` with `"Autenticación requerida"`, an invalid one `403` with
/// `"Token inválido"`. Only an admitted handshake upgrades the transport.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok());
    if !state.config.server.origin_allowed(origin) {
        debug!(origin = origin.unwrap_or("-"), "handshake rejected: origin");
        return (StatusCode::FORBIDDEN, "Origen no permitido").into_response();
    }

    match auth::verify(query.token.as_deref(), &state.config.auth.secret) {
        Ok(claims) => ws.on_upgrade(move |socket| handle_ws(socket, state, claims)),
        Err(e @ AuthError::Missing) => (StatusCode::UNAUTHORIZED, e.to_string()).into_response(),
        Err(e @ AuthError::Invalid) => (StatusCode::FORBIDDEN, e.to_string()).into_response(),
    }
}

/// Main per-connection event loop.
///
/// Splits the socket into a sink (outgoing) and stream (incoming). The sink
/// lives in a send task that also owns keep-alive: it pings on the configured
/// interval and closes the connection when the client has been silent past
/// the timeout.
async fn handle_ws(socket: WebSocket, state: AppState, claims: Claims) {
    let conn_id = Uuid::new_v4();
    let (mut ws_sink, mut ws_stream) = socket.split();

    // Channel for sending events back to the WebSocket
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(state.config.server.send_queue_capacity);

    state.connections.fetch_add(1, Ordering::Relaxed);
    info!(%conn_id, user = %claims.sub, "client connected");

    // Liveness: epoch-ms of the last inbound frame, shared with the send task
    let last_seen = Arc::new(AtomicU64::new(now_ms()));
    let keepalive_interval = Duration::from_secs(state.config.server.keepalive_interval_secs);
    let keepalive_timeout_ms = state.config.server.keepalive_timeout_secs * 1000;

    // Task: forward channel events to the sink, interleaved with pings
    let send_last_seen = Arc::clone(&last_seen);
    let send_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(keepalive_interval);
        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(t) => t,
                        Err(e) => {
                            error!("WS send: failed to serialize event: {e}");
                            continue;
                        }
                    };
                    if ws_sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let idle = now_ms().saturating_sub(send_last_seen.load(Ordering::Relaxed));
                    if idle > keepalive_timeout_ms {
                        let _ = ws_sink.send(Message::Close(None)).await;
                        break;
                    }
                    if ws_sink.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut session = Session::new(conn_id, claims, tx.clone());
    let reply_delay = Duration::from_millis(state.config.reply.delay_ms);

    while let Some(Ok(msg)) = ws_stream.next().await {
        last_seen.store(now_ms(), Ordering::Relaxed);
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(ClientEvent::Authenticate { user_id }) => {
                    session.handle_authenticate(user_id, &state.rooms).await;
                }
                Ok(ClientEvent::Message { payload }) => {
                    session
                        .handle_message(payload, &state.rooms, &state.replies, reply_delay)
                        .await;
                }
                Ok(ClientEvent::CancelResponse) => {
                    session.handle_cancel(&state.rooms).await;
                }
                Err(e) => {
                    debug!(%conn_id, error = %e, "unparseable client event");
                    let _ = tx.send(ServerEvent::error("Evento no reconocido")).await;
                }
            },
            Message::Close(_) => break,
            // Pings and pongs only refresh liveness
            _ => {}
        }
    }

    // Connection closed — deterministic cleanup, pending work discarded silently
    session.teardown(&state.rooms).await;
    state.connections.fetch_sub(1, Ordering::Relaxed);
    info!(%conn_id, "client disconnected");
    send_task.abort();
}
