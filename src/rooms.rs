//! Identity-keyed rooms for event fan-out.
//!
//! A room is the set of live connections bound to one recipient identity, so
//! a user reading on two devices sees the same conversation on both. Any
//! component holding a [`Rooms`] clone can publish to a subject; delivery is
//! fire-and-forget — a slow or gone recipient never blocks the publisher and
//! nothing is retried.
//!
//! ## Concurrency
//!
//! The membership map is behind an `RwLock` shared by all clones. `publish`
//! snapshots a room's senders under the read lock, so it always sees a
//! consistent membership — never a half-applied join or leave.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::events::ServerEvent;

/// Registry of rooms, keyed by identity subject.
///
/// Cloneable — all clones share the same inner map.
#[derive(Clone, Default)]
pub struct Rooms {
    inner: Arc<RwLock<HashMap<String, HashMap<Uuid, mpsc::Sender<ServerEvent>>>>>,
}

impl Rooms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to the room for `subject`, creating the room if needed.
    pub async fn join(&self, conn_id: Uuid, subject: &str, tx: mpsc::Sender<ServerEvent>) {
        let mut rooms = self.inner.write().await;
        rooms.entry(subject.to_string()).or_default().insert(conn_id, tx);
        debug!(%conn_id, subject, "joined room");
    }

    /// Remove a connection from the room for `subject`. Empty rooms are
    /// dropped so the map doesn't accumulate dead subjects.
    pub async fn leave(&self, conn_id: Uuid, subject: &str) {
        let mut rooms = self.inner.write().await;
        if let Some(members) = rooms.get_mut(subject) {
            members.remove(&conn_id);
            if members.is_empty() {
                rooms.remove(subject);
            }
            debug!(%conn_id, subject, "left room");
        }
    }

    /// Deliver `event` to every connection currently in the room for
    /// `subject`. No-op if the room is empty or absent.
    ///
    /// A member whose outgoing queue is full has the event dropped — the
    /// publisher never waits on a slow recipient.
    pub async fn publish(&self, subject: &str, event: &ServerEvent) {
        let targets: Vec<mpsc::Sender<ServerEvent>> = {
            let rooms = self.inner.read().await;
            match rooms.get(subject) {
                Some(members) => members.values().cloned().collect(),
                None => return,
            }
        };
        for tx in targets {
            if tx.try_send(event.clone()).is_err() {
                debug!(subject, "dropped event for saturated or closed connection");
            }
        }
    }

    /// Number of connections in the room for `subject`.
    pub async fn member_count(&self, subject: &str) -> usize {
        self.inner.read().await.get(subject).map_or(0, HashMap::len)
    }

    /// Number of non-empty rooms.
    pub async fn room_count(&self) -> usize {
        self.inner.read().await.len()
    }
}
