//! TLS acceptor construction and the plain/TLS client stream wrapper.
//!
//! TLS on the listener is optional and decided entirely by configuration.
//! When enabled, the certificate chain and private key are loaded from PEM
//! files exactly once, at startup, before the listener binds: a bad path or
//! malformed file aborts the process instead of failing connections one at
//! a time.
//!
//! [`ClientStream`] erases the plain-vs-TLS distinction so the WebSocket
//! upgrade and everything after it run identically on both transports.

use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

use crate::domain::config::TlsConfig;

/// Error type for TLS material loading. Always startup-fatal.
#[derive(Debug, Error)]
pub enum TlsError {
    /// A file system I/O error occurred while reading PEM material.
    #[error("I/O error reading TLS material at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The certificate file contained no PEM certificates.
    #[error("no certificates found in {path}")]
    NoCertificates { path: PathBuf },

    /// The key file contained no PEM private key.
    #[error("no private key found in {path}")]
    NoPrivateKey { path: PathBuf },

    /// rustls rejected the certificate/key pair.
    #[error("TLS configuration rejected: {0}")]
    Rustls(#[from] tokio_rustls::rustls::Error),
}

/// Builds the server-side TLS acceptor from the configured PEM files.
///
/// # Errors
///
/// Returns a [`TlsError`] when either file cannot be read, contains no
/// usable material, or rustls rejects the pair. Callers treat any error as
/// fatal: the process must not begin listening with broken TLS material.
pub fn build_tls_acceptor(tls: &TlsConfig) -> Result<TlsAcceptor, TlsError> {
    let certs = load_certs(&tls.certificate)?;
    let key = load_private_key(&tls.private_key)?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Reads the full PEM certificate chain from `path`.
fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = File::open(path).map_err(|source| TlsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(file);

    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates {
            path: path.to_path_buf(),
        });
    }
    Ok(certs)
}

/// Reads the first PEM private key (PKCS#8, RSA, or SEC1) from `path`.
fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let file = File::open(path).map_err(|source| TlsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey {
            path: path.to_path_buf(),
        })
}

// ── Plain/TLS stream wrapper ──────────────────────────────────────────────────

/// An accepted client connection, before or after the TLS handshake.
///
/// The WebSocket upgrade is generic over `AsyncRead + AsyncWrite`, so this
/// enum lets one code path serve both transports.
pub enum ClientStream {
    /// Plain TCP connection (TLS disabled in configuration).
    Plain(TcpStream),
    /// Connection wrapped in a completed server-side TLS handshake.
    Tls(Box<tokio_rustls::server::TlsStream<TcpStream>>),
}

impl ClientStream {
    /// The peer's socket address, for session logging.
    pub fn peer_addr(&self) -> std::io::Result<SocketAddr> {
        match self {
            Self::Plain(stream) => stream.peer_addr(),
            Self::Tls(stream) => stream.get_ref().0.peer_addr(),
        }
    }
}

impl AsyncRead for ClientStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match &mut *self {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ClientStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, std::io::Error>> {
        match &mut *self {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), std::io::Error>> {
        match &mut *self {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), std::io::Error>> {
        match &mut *self {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ws_relay_tls_{}_{}", name, uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_missing_certificate_file_is_io_error() {
        let tls = TlsConfig {
            certificate: temp_path("missing_cert.pem"),
            private_key: temp_path("missing_key.pem"),
        };
        let result = build_tls_acceptor(&tls);
        assert!(matches!(result, Err(TlsError::Io { .. })));
    }

    #[test]
    fn test_certificate_file_without_pem_certs_is_rejected() {
        let path = temp_path("garbage_cert.pem");
        std::fs::write(&path, "this is not a certificate").expect("write");

        let result = load_certs(&path);

        assert!(matches!(result, Err(TlsError::NoCertificates { .. })));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_key_file_without_pem_key_is_rejected() {
        let path = temp_path("garbage_key.pem");
        std::fs::write(&path, "this is not a key").expect("write");

        let result = load_private_key(&path);

        assert!(matches!(result, Err(TlsError::NoPrivateKey { .. })));
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_plain_client_stream_passes_bytes_through() {
        // Arrange: a real loopback TCP pair.
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");

        let (client, accepted) =
            tokio::join!(TcpStream::connect(addr), async { listener.accept().await });
        let mut client = ClientStream::Plain(client.expect("connect"));
        let (mut server, _) = accepted.expect("accept");

        // Act: write through the wrapper, read on the raw server side.
        client.write_all(b"ping").await.expect("write");
        client.flush().await.expect("flush");
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.expect("read");

        // Assert
        assert_eq!(&buf, b"ping");
        assert!(client.peer_addr().is_ok());
    }
}
