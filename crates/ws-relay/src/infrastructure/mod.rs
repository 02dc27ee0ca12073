//! Infrastructure layer for ws-relay.
//!
//! The infrastructure layer handles all I/O: accepting client connections on
//! the listening socket, performing the optional TLS handshake and the
//! WebSocket upgrade, dialing backends, and running each session's lifecycle
//! in its own Tokio task.
//!
//! # Responsibilities
//!
//! - Constructing the TLS acceptor from configured PEM material (startup)
//! - Binding the TCP listener and running the accept loop
//! - Performing the WebSocket HTTP upgrade handshake (capturing the path)
//! - Opening the backend WebSocket connection for each session
//! - Driving both forwarding directions and the coordinated teardown
//! - Handling the graceful shutdown signal
//!
//! # What does NOT belong here?
//!
//! - Route resolution and configuration schema (that is the domain layer)
//! - The forwarding loop semantics (that is the application layer)
//! - Configuration parsing (that is done in `main.rs`)

pub mod backend_conn;
pub mod tls;
pub mod ws_server;

// Re-export the primary entry point so `main.rs` can call it concisely.
pub use ws_server::run_server;
