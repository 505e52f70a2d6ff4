//! Per-connection session state and the message pipeline.
//!
//! A [`Session`] exists for exactly one live WebSocket connection, created
//! after the handshake gate admits it and destroyed on disconnect. It owns
//! the connection's bound recipient identity and the handle to the one
//! in-flight reply, if any.
//!
//! ## Pipeline
//!
//! An inbound message runs a fixed sequence: precondition check (must be
//! bound), validation, acknowledgement (`ai:typing` then `message:sent`, in
//! that order, before anything else), then scheduling of the reply. The
//! scheduled reply is a spawned task guarded by a `CancellationToken`; the
//! token is checked atomically via `select!` before any completion event
//! fires, so "already fired vs. still pending vs. cancelled" can never race
//! into a half-emitted state.
//!
//! The dispatcher processes one event at a time per connection, so none of
//! these methods overlap with each other for the same session. Scheduling
//! returns immediately — a `cancel:response` is serviceable while the reply
//! is still pending.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::Claims;
use crate::events::{MessagePayload, ServerEvent};
use crate::reply::ReplyGenerator;
use crate::rooms::Rooms;
use crate::util::now_ms;

/// Recoverable per-session errors, reported to the originating connection
/// only. The session stays alive and returns to idle.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// A message arrived before the connection bound an identity.
    #[error("No autenticado: envía authenticate antes de chatear")]
    Unauthenticated,
    /// The payload had no usable text field, or an `authenticate` carried no
    /// usable `userId`.
    #[error("El mensaje debe incluir un texto no vacío")]
    InvalidPayload,
}

/// Handle to the one scheduled reply of a session.
///
/// Cancellation is cooperative: [`cancel`](Self::cancel) flips the token and
/// the reply task, which `select!`s on it, exits without emitting anything.
/// If the task already passed the select, the events are on their way and
/// cancelling is a no-op.
pub struct PendingReply {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PendingReply {
    /// Prevent the reply from firing. Idempotent; harmless after completion.
    pub fn cancel(self) {
        self.cancel.cancel();
    }

    /// Whether the reply task has already run to completion (fired or
    /// cancelled).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Server-side state bound to one live connection.
pub struct Session {
    /// Unique id of the underlying connection.
    pub conn_id: Uuid,
    /// Identity claim attached by the handshake gate. Immutable.
    claims: Claims,
    /// Recipient identity this connection is bound to (room subject). Set by
    /// `authenticate`; re-binding overwrites it and moves room membership.
    bound: Option<String>,
    /// At most one outstanding reply at any time.
    pending: Option<PendingReply>,
    /// Direct lane to this connection, used for error events (never
    /// broadcast) and as the delivery channel registered in rooms.
    tx: mpsc::Sender<ServerEvent>,
}

impl Session {
    pub fn new(conn_id: Uuid, claims: Claims, tx: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            conn_id,
            claims,
            bound: None,
            pending: None,
            tx,
        }
    }

    /// Subject of the room this session is bound to, if any.
    pub fn subject(&self) -> Option<&str> {
        self.bound.as_deref()
    }

    /// Bind this connection to `user_id` and join its room.
    ///
    /// Re-binding leaves the previous room first, so a connection is never a
    /// member of two rooms and never receives duplicate deliveries.
    pub async fn handle_authenticate(&mut self, user_id: Option<String>, rooms: &Rooms) {
        let Some(user_id) = user_id.filter(|u| !u.is_empty()) else {
            let _ = self
                .tx
                .send(ServerEvent::error(SessionError::InvalidPayload))
                .await;
            return;
        };
        if let Some(prev) = self.bound.take() {
            rooms.leave(self.conn_id, &prev).await;
        }
        rooms.join(self.conn_id, &user_id, self.tx.clone()).await;
        debug!(conn_id = %self.conn_id, subject = %self.claims.sub, room = %user_id, "bound");
        self.bound = Some(user_id);
    }

    /// Run the message pipeline for one inbound payload.
    pub async fn handle_message(
        &mut self,
        payload: MessagePayload,
        rooms: &Rooms,
        replies: &Arc<dyn ReplyGenerator>,
        delay: Duration,
    ) {
        self.reap_finished();

        let Some(subject) = self.bound.clone() else {
            let _ = self
                .tx
                .send(ServerEvent::error(SessionError::Unauthenticated))
                .await;
            return;
        };

        // A new message supersedes the outstanding reply: cancel it and
        // resync the indicator before validating the newcomer.
        if let Some(pending) = self.pending.take() {
            pending.cancel();
            rooms.publish(&subject, &ServerEvent::typing(false)).await;
        }

        let Some(text) = payload.text().map(ToString::to_string) else {
            let _ = self
                .tx
                .send(ServerEvent::error(SessionError::InvalidPayload))
                .await;
            return;
        };

        // Acknowledge in contract order: typing starts before the client can
        // see its own bubble confirmed.
        rooms.publish(&subject, &ServerEvent::typing(true)).await;
        rooms
            .publish(
                &subject,
                &ServerEvent::message_sent(payload, &subject, now_ms()),
            )
            .await;

        self.pending = Some(self.schedule_reply(text, subject, rooms, replies, delay));
    }

    /// Cancel the in-flight reply. Idempotent: with nothing pending, only the
    /// indicator resync is emitted.
    pub async fn handle_cancel(&mut self, rooms: &Rooms) {
        if let Some(pending) = self.pending.take() {
            pending.cancel();
            debug!(conn_id = %self.conn_id, "reply cancelled");
        }
        match self.bound.as_deref() {
            Some(subject) => rooms.publish(subject, &ServerEvent::typing(false)).await,
            None => {
                let _ = self.tx.send(ServerEvent::typing(false)).await;
            }
        }
    }

    /// Release everything this session holds. Safe to call in any state,
    /// including before authentication, and safe to call twice.
    ///
    /// The pending reply is cancelled silently — the connection is already
    /// gone, so no events are emitted on its behalf.
    pub async fn teardown(&mut self, rooms: &Rooms) {
        if let Some(pending) = self.pending.take() {
            pending.cancel();
        }
        if let Some(subject) = self.bound.take() {
            rooms.leave(self.conn_id, &subject).await;
        }
    }

    /// Drop the handle of a reply that already fired, so later events don't
    /// mistake it for in-flight work.
    fn reap_finished(&mut self) {
        if self.pending.as_ref().is_some_and(PendingReply::is_finished) {
            self.pending = None;
        }
    }

    fn schedule_reply(
        &self,
        text: String,
        subject: String,
        rooms: &Rooms,
        replies: &Arc<dyn ReplyGenerator>,
        delay: Duration,
    ) -> PendingReply {
        let cancel = CancellationToken::new();
        let guard = cancel.clone();
        let rooms = rooms.clone();
        let replies = Arc::clone(replies);
        let errors = self.tx.clone();
        let conn_id = self.conn_id;

        let task = tokio::spawn(async move {
            tokio::select! {
                () = guard.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    match replies.generate(&text, &subject) {
                        Ok(reply) => {
                            rooms.publish(&subject, &ServerEvent::typing(false)).await;
                            rooms
                                .publish(
                                    &subject,
                                    &ServerEvent::message_received(&subject, reply, now_ms()),
                                )
                                .await;
                        }
                        Err(e) => {
                            // Error to this connection only; indicator off so
                            // it can never get stuck on.
                            warn!(%conn_id, error = %e, "reply generation failed");
                            let _ = errors.send(ServerEvent::error(&e)).await;
                            rooms.publish(&subject, &ServerEvent::typing(false)).await;
                        }
                    }
                }
            }
        });

        PendingReply { cancel, task }
    }
}
