//! Domain layer for ws-relay.
//!
//! The domain layer contains pure business-logic types that have no
//! dependencies on I/O, networking, or external frameworks.
//!
//! # What belongs in the domain layer?
//!
//! - The route table (request path → backend port)
//! - Configuration structures and their file schema
//! - Error types that describe configuration failures
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, or `WebSocket` types
//! - TLS material loading (that is infrastructure; the domain only carries
//!   the file paths)

pub mod config;
pub mod routes;

// Re-export the most commonly needed types at the domain module boundary.
pub use config::{ConfigError, ListenConfig, RelayConfig, RelayTuning, TlsConfig};
pub use routes::RouteTable;
