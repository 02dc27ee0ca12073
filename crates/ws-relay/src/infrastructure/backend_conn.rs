//! Backend WebSocket dial.
//!
//! Every routed session opens exactly one new WebSocket connection to the
//! backend service at `ws://localhost:<port>`. Backends are always plain
//! WebSocket: TLS, when enabled, terminates at the listener and never
//! extends to the loopback hop.
//!
//! The dial is bounded by the configured timeout so a backend that accepts
//! TCP but never completes the WebSocket handshake cannot park a session in
//! the dialing phase forever.

use std::time::Duration;

use anyhow::{anyhow, Context};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// The backend-facing half of a relay session.
pub type BackendStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket URL for a backend port on the local host.
pub fn backend_url(port: u16) -> String {
    format!("ws://localhost:{port}")
}

/// Opens a WebSocket connection to the backend at `localhost:<port>`.
///
/// # Errors
///
/// Returns an error when the dial times out, the TCP connection is refused,
/// or the backend rejects the WebSocket handshake. The caller closes the
/// client connection in response; dial failures are never retried.
pub async fn dial_backend(
    port: u16,
    dial_timeout: Duration,
    session_id: &str,
) -> anyhow::Result<BackendStream> {
    let url = backend_url(port);

    let (stream, _response) = timeout(dial_timeout, connect_async(url.as_str()))
        .await
        .map_err(|_| anyhow!("session {session_id}: backend dial to {url} timed out"))?
        .with_context(|| format!("session {session_id}: failed to connect to backend at {url}"))?;

    Ok(stream)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    #[test]
    fn test_backend_url_format() {
        assert_eq!(backend_url(327), "ws://localhost:327");
        assert_eq!(backend_url(65535), "ws://localhost:65535");
    }

    #[tokio::test]
    async fn test_dial_refused_port_errors() {
        // Bind and immediately drop a listener to find a port nobody serves.
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        drop(listener);

        let result = dial_backend(port, Duration::from_secs(2), "t").await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_dial_connects_to_listening_backend() {
        // Arrange: a backend that accepts one WebSocket upgrade.
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                let _ws = accept_async(stream).await;
            }
        });

        // Act
        let result = dial_backend(port, Duration::from_secs(2), "t").await;

        // Assert
        assert!(result.is_ok());
    }
}
