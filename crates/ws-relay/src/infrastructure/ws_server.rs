//! WebSocket listener: accept loop and per-session relay lifecycle.
//!
//! This module is responsible for:
//!
//! 1. Constructing the TLS acceptor (when configured) before anything binds,
//!    so broken TLS material is fatal at startup rather than per-connection.
//! 2. Binding the TCP listener on the configured address.
//! 3. Accepting incoming connections and spawning one Tokio task per
//!    connection, so the accept loop never waits on a session.
//! 4. Per session: optional TLS handshake, WebSocket upgrade (capturing the
//!    request path), route lookup, backend dial, both forwarding directions,
//!    and coordinated teardown.
//! 5. Exiting cleanly when the `running` flag is cleared.
//!
//! # Session lifecycle
//!
//! ```text
//! accept → upgrade → route lookup ──unmapped──→ close client ("no route")
//!                        │
//!                     dial backend ──failure──→ close client ("backend unavailable")
//!                        │
//!                  two forwarding directions run concurrently
//!                        │ (either ends: close, EOF, or I/O error)
//!                  close both connections (best-effort, bounded)
//! ```
//!
//! A handshake failure on one connection only drops that connection; the
//! listener and every other session keep running.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::{close_reason, forward, CloseReason, Direction};
use crate::domain::config::RelayConfig;
use crate::domain::routes::RouteTable;
use crate::infrastructure::backend_conn::dial_backend;
use crate::infrastructure::tls::{build_tls_acceptor, ClientStream};

/// How often the accept loop re-checks the shutdown flag when idle.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// Runs the relay's accept loop until `running` is set to `false`.
///
/// Builds the TLS acceptor (if configured) and binds the listener, then
/// accepts connections in a loop. Each accepted connection is handed off to
/// a dedicated Tokio task so one slow session never blocks others.
///
/// # Errors
///
/// Returns an error if the TLS acceptor cannot be constructed from the
/// configured material, or if the listener cannot be bound. Both are fatal:
/// the relay never starts serving in a half-working state.
pub async fn run_server(
    config: RelayConfig,
    routes: Arc<RouteTable>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    // TLS material problems surface here, before the socket exists.
    let tls_acceptor = match &config.tls {
        Some(tls) => Some(
            build_tls_acceptor(tls).context("failed to construct TLS acceptor from config")?,
        ),
        None => None,
    };

    let bind_addr = config.bind_addr().context("invalid listener address")?;
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind relay listener on {bind_addr}"))?;

    info!(
        "relay listening on {bind_addr} (tls: {}, routes: {})",
        tls_acceptor.is_some(),
        routes.len()
    );

    let config = Arc::new(config);

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // A short timeout on accept() lets the loop re-check `running`
        // periodically even when no clients are connecting.
        match timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("new client connection from {peer_addr}");
                let cfg = Arc::clone(&config);
                let routes = Arc::clone(&routes);
                let acceptor = tls_acceptor.clone();

                tokio::spawn(async move {
                    handle_client_session(stream, peer_addr, acceptor, cfg, routes).await;
                });
            }
            Ok(Err(e)) => {
                // Transient accept error (e.g. file-descriptor exhaustion).
                // Keep serving; the affected connection is already gone.
                error!("accept error: {e}");
            }
            Err(_) => {
                // Poll timeout; loop back to check the `running` flag.
            }
        }
    }

    Ok(())
}

// ── Per-session handler ───────────────────────────────────────────────────────

/// Top-level handler for a single client connection.
///
/// Wraps [`run_session`] and logs the outcome. The outer/inner pair keeps
/// `?`-based error propagation inside `run_session` while this function
/// turns every outcome into a log line and nothing else: session failures
/// never escape their task.
async fn handle_client_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    acceptor: Option<TlsAcceptor>,
    config: Arc<RelayConfig>,
    routes: Arc<RouteTable>,
) {
    let session_id = Uuid::new_v4();
    match run_session(raw_stream, peer_addr, acceptor, config, routes, session_id).await {
        Ok(reason) => info!("session {session_id} ({peer_addr}) closed: {reason}"),
        Err(e) => warn!("session {session_id} ({peer_addr}) dropped: {e:#}"),
    }
}

/// Runs the complete lifecycle of one relay session.
///
/// Returns the close reason for a session that got far enough to be closed
/// deliberately, or an error for a connection that failed during the TLS or
/// WebSocket handshake (those are simply dropped).
async fn run_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    acceptor: Option<TlsAcceptor>,
    config: Arc<RelayConfig>,
    routes: Arc<RouteTable>,
    session_id: Uuid,
) -> anyhow::Result<CloseReason> {
    // ── Optional server-side TLS handshake ────────────────────────────────────
    let stream = match acceptor {
        Some(acceptor) => {
            let tls_stream = acceptor
                .accept(raw_stream)
                .await
                .with_context(|| format!("TLS handshake failed with {peer_addr}"))?;
            ClientStream::Tls(Box::new(tls_stream))
        }
        None => ClientStream::Plain(raw_stream),
    };

    // ── WebSocket upgrade, capturing the request path ─────────────────────────
    //
    // The request path is only visible during the HTTP upgrade, so the
    // header callback stashes it for the route lookup below. Routing happens
    // after the upgrade completes: an unmapped path gets a proper WebSocket
    // close, not a failed handshake.
    let request_path: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let path_capture = Arc::clone(&request_path);
    let callback = move |req: &Request, response: Response| {
        if let Ok(mut guard) = path_capture.lock() {
            *guard = Some(req.uri().path().to_string());
        }
        Ok(response)
    };

    let mut client_ws = accept_hdr_async(stream, callback)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let path = request_path
        .lock()
        .ok()
        .and_then(|guard| guard.clone())
        .unwrap_or_default();

    // ── Route lookup ──────────────────────────────────────────────────────────
    let Some(backend_port) = routes.resolve(&path) else {
        info!("session {session_id}: no route for path {path:?}");
        let _ = timeout(config.close_grace(), client_ws.close(None)).await;
        return Ok(CloseReason::NoRoute);
    };

    // ── Backend dial ──────────────────────────────────────────────────────────
    let sid = session_id.to_string();
    let backend_ws = match dial_backend(backend_port, config.dial_timeout(), &sid).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("session {session_id}: {e:#}");
            let _ = timeout(config.close_grace(), client_ws.close(None)).await;
            return Ok(CloseReason::BackendUnavailable);
        }
    };

    info!("session {session_id}: relaying {peer_addr} ({path}) to localhost:{backend_port}");

    // ── Relaying: both directions concurrently ────────────────────────────────
    //
    // Each direction owns its own read half and the opposite write half, so
    // the two `forward` futures borrow disjoint state and run concurrently
    // within this task. The first to finish wins the select!; the other is
    // dropped at its suspension point, which cancels it cleanly.
    let (mut client_tx, mut client_rx) = client_ws.split();
    let (mut backend_tx, mut backend_rx) = backend_ws.split();

    let (finished, end) = tokio::select! {
        end = forward(&mut client_rx, &mut backend_tx, Direction::ClientToBackend, &sid) => {
            (Direction::ClientToBackend, end)
        }
        end = forward(&mut backend_rx, &mut client_tx, Direction::BackendToClient, &sid) => {
            (Direction::BackendToClient, end)
        }
    };

    let reason = close_reason(finished, &end);
    debug!("session {session_id}: {finished} ended ({end:?})");

    // ── Coordinated teardown ──────────────────────────────────────────────────
    //
    // Whichever side ended first, both connections get a best-effort close so
    // neither peer is left attached to a dead session. Each attempt is
    // bounded by the close grace period, and a close that fails because the
    // peer is already gone is discarded.
    let grace = config.close_grace();
    let _ = timeout(grace, client_tx.close()).await;
    let _ = timeout(grace, backend_tx.close()).await;

    Ok(reason)
}
