//! HTTP route handlers.
//!
//! The REST surface is deliberately thin: everything interactive happens over
//! the WebSocket (see [`crate::ws`]).

pub mod health;
