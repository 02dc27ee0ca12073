//! ws-relay library crate.
//!
//! This crate provides a path-routed WebSocket relay: clients connect to one
//! listening port (optionally over TLS), the request path selects a backend
//! service on the local host, and the relay forwards messages in both
//! directions for the lifetime of the connection.
//!
//! # Architecture
//!
//! ```text
//! Client (WebSocket, optionally wss://)
//!         ↕
//! [ws-relay]
//!   ├── domain/           Pure types: RouteTable, RelayConfig
//!   ├── application/      Session semantics: forwarding loop, close reasons
//!   └── infrastructure/
//!         ├── tls/          TLS acceptor construction, plain/TLS stream wrapper
//!         ├── ws_server/    Accept loop, upgrade, per-session lifecycle
//!         └── backend_conn/ WebSocket dial to the routed backend
//!         ↕
//! Backend service (plain WebSocket on localhost:<routed port>)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no external dependencies (no I/O, no async, no frameworks).
//! - `application` depends on `domain` plus the WebSocket message types only.
//! - `infrastructure` depends on all other layers plus `tokio`, `tungstenite`,
//!   and `rustls`.

/// Domain layer: pure business-logic types (no I/O).
pub mod domain;

/// Application layer: per-session relay semantics.
pub mod application;

/// Infrastructure layer: listener, TLS, and backend connections.
pub mod infrastructure;
