//! ws-relay — entry point.
//!
//! This binary accepts WebSocket connections on a single listening port
//! (optionally over TLS), routes each connection by its request path to a
//! backend TCP port on the local host, and relays messages in both
//! directions until either side closes.
//!
//! # Usage
//!
//! ```text
//! ws-relay [OPTIONS]
//!
//! Options:
//!   --config      <PATH>   Path to the TOML config file [default: relay.toml]
//!   --listen-port <PORT>   Override the configured listen port
//!   --bind        <ADDR>   Override the configured bind address
//! ```
//!
//! # Environment variable overrides
//!
//! CLI args take precedence when both are present.
//!
//! | Variable          | Description                  |
//! |-------------------|------------------------------|
//! | `WS_RELAY_CONFIG` | Config file path             |
//! | `WS_RELAY_PORT`   | Listen port override         |
//! | `WS_RELAY_BIND`   | Bind address override        |
//!
//! Log verbosity is controlled by `RUST_LOG` (e.g. `RUST_LOG=debug`).
//!
//! # What happens at startup
//!
//! 1. `tracing_subscriber` is initialised (default level `info`).
//! 2. The TOML config is loaded and validated; CLI overrides are applied.
//! 3. The route table is built and logged.
//! 4. A Ctrl+C handler is spawned; it clears a shared `AtomicBool`.
//! 5. [`run_server`] binds the listener (constructing the TLS acceptor
//!    first, when configured) and accepts connections until shutdown.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ws_relay::domain::config::RelayConfig;
use ws_relay::infrastructure::run_server;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Path-routed WebSocket relay.
///
/// Accepts WebSocket connections, maps the request path to a backend port on
/// the local host, and forwards messages bidirectionally.
#[derive(Debug, Parser)]
#[command(
    name = "ws-relay",
    about = "Path-routed WebSocket relay for local backend services",
    version
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "relay.toml", env = "WS_RELAY_CONFIG")]
    config: PathBuf,

    /// Override the listen port from the config file.
    #[arg(long, env = "WS_RELAY_PORT")]
    listen_port: Option<u16>,

    /// Override the bind address from the config file.
    ///
    /// Use `0.0.0.0` to accept connections from any network interface, or
    /// `127.0.0.1` to accept only local connections.
    #[arg(long, env = "WS_RELAY_BIND")]
    bind: Option<String>,
}

impl Cli {
    /// Loads the config file and applies the CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting configuration fails validation.
    fn into_config(self) -> anyhow::Result<RelayConfig> {
        let mut config = RelayConfig::load(&self.config)
            .with_context(|| format!("failed to load config from {}", self.config.display()))?;
        apply_overrides(&mut config, self.listen_port, self.bind);
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

/// Applies CLI/env overrides on top of the file-based configuration.
fn apply_overrides(config: &mut RelayConfig, listen_port: Option<u16>, bind: Option<String>) {
    if let Some(port) = listen_port {
        config.listen.port = port;
    }
    if let Some(bind) = bind {
        config.listen.bind_address = bind;
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // `RUST_LOG` controls the filter; absent or invalid falls back to `info`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_config()?;
    let routes = Arc::new(config.route_table());

    if routes.is_empty() {
        // Legal but useless: every connection will be rejected as unmapped.
        warn!("route table is empty; all connections will be rejected");
    } else {
        let mut paths: Vec<&str> = routes.paths().collect();
        paths.sort_unstable();
        info!("routing {} path(s): {}", routes.len(), paths.join(", "));
    }

    // Graceful shutdown: Ctrl+C clears the flag, the accept loop notices
    // within its poll interval and exits.
    let running = Arc::new(AtomicBool::new(true));
    let running_signal = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                running_signal.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(config, routes, running).await?;

    info!("relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
