//! Application layer for ws-relay.
//!
//! The application layer holds the per-session relay semantics: which frames
//! cross from one connection to the other, in what order, and how the end of
//! a forwarding direction is classified for teardown and logging.
//!
//! # Responsibilities
//!
//! - The message-forwarding loop for one direction of a session
//! - Classifying why a direction ended ([`relay_service::DirectionEnd`])
//! - Deriving the session close reason ([`relay_service::CloseReason`])
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or listening for connections (that is infrastructure)
//! - Tokio task spawning (that happens in the infrastructure layer)
//! - WebSocket framing (handled by tokio-tungstenite)

pub mod relay_service;

// Re-export so callers can write `application::forward` and friends.
pub use relay_service::{close_reason, forward, CloseReason, Direction, DirectionEnd};
