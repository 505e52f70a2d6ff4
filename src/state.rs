//! Shared application state passed to every handler via Axum's `State` extractor.

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::reply::{EchoAssistant, ReplyGenerator};
use crate::rooms::Rooms;

/// Shared application state for the charla server.
///
/// Constructed once at process start and handed to the router; there is no
/// ambient singleton.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration loaded at startup.
    pub config: Arc<Config>,
    /// Monotonic instant when the server started (for uptime calculation).
    pub start_time: Instant,
    /// Identity-keyed rooms for multi-device event fan-out.
    pub rooms: Rooms,
    /// Reply-generation collaborator behind its trait boundary.
    pub replies: Arc<dyn ReplyGenerator>,
    /// Current number of live WebSocket connections.
    pub connections: Arc<AtomicUsize>,
}

impl AppState {
    /// Build state with the default reply collaborator.
    pub fn new(config: Config) -> Self {
        Self::with_replies(config, Arc::new(EchoAssistant))
    }

    /// Build state with a specific reply collaborator.
    pub fn with_replies(config: Config, replies: Arc<dyn ReplyGenerator>) -> Self {
        Self {
            config: Arc::new(config),
            start_time: Instant::now(),
            rooms: Rooms::new(),
            replies,
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }
}
