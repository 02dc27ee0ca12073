//! Per-direction forwarding loop and session close classification.
//!
//! A relay session runs two copies of [`forward`] concurrently, one per
//! direction. Each copy reads messages from its source connection and writes
//! them unmodified to its destination, preserving arrival order and message
//! type (text stays text, binary stays binary). The loop is generic over the
//! stream/sink pair so the same code drives both the client-facing and the
//! backend-facing connection, and so it can be tested without sockets.
//!
//! # Frame policy
//!
//! - `Text` and `Binary` frames are forwarded as-is. Payloads are opaque:
//!   no inspection, no transformation, no re-framing.
//! - `Ping`/`Pong` are link-local keepalives; each hop's WebSocket library
//!   answers pings on its own connection, so they are not forwarded.
//! - `Close` ends the direction. The frame itself is not forwarded; the
//!   session closes the opposite connection during teardown instead.
//!
//! # Error policy
//!
//! Any read or write failure ends the direction. Nothing is retried and no
//! partial message is replayed; the session tears down both connections.

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, trace};

// ── Direction and outcome types ───────────────────────────────────────────────

/// One of the two forwarding directions within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Reads from the client connection, writes to the backend.
    ClientToBackend,
    /// Reads from the backend connection, writes to the client.
    BackendToClient,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::ClientToBackend => write!(f, "client→backend"),
            Direction::BackendToClient => write!(f, "backend→client"),
        }
    }
}

/// Why a forwarding direction stopped.
#[derive(Debug)]
pub enum DirectionEnd {
    /// The source connection ended: a Close frame, a clean end of stream,
    /// or a peer that went away without a closing handshake.
    SourceClosed,
    /// Reading the next message from the source failed.
    ReadFailed(WsError),
    /// Writing a message to the destination failed.
    WriteFailed(WsError),
}

/// Why the whole session ended, derived from whichever direction finished
/// first. Logged once on teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The request path is not in the route table; no backend was dialed.
    NoRoute,
    /// The backend dial failed or timed out.
    BackendUnavailable,
    /// The client closed its connection.
    ClientClosed,
    /// The backend closed its connection.
    BackendClosed,
    /// I/O toward the client failed mid-session.
    ClientError,
    /// I/O toward the backend failed mid-session.
    BackendError,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CloseReason::NoRoute => "no route",
            CloseReason::BackendUnavailable => "backend unavailable",
            CloseReason::ClientClosed => "client closed",
            CloseReason::BackendClosed => "backend closed",
            CloseReason::ClientError => "client I/O error",
            CloseReason::BackendError => "backend I/O error",
        };
        f.write_str(s)
    }
}

/// Maps the first-finished direction and its end state to the session close
/// reason.
pub fn close_reason(direction: Direction, end: &DirectionEnd) -> CloseReason {
    match (direction, end) {
        (Direction::ClientToBackend, DirectionEnd::SourceClosed) => CloseReason::ClientClosed,
        (Direction::ClientToBackend, DirectionEnd::ReadFailed(_)) => CloseReason::ClientError,
        (Direction::ClientToBackend, DirectionEnd::WriteFailed(_)) => CloseReason::BackendError,
        (Direction::BackendToClient, DirectionEnd::SourceClosed) => CloseReason::BackendClosed,
        (Direction::BackendToClient, DirectionEnd::ReadFailed(_)) => CloseReason::BackendError,
        (Direction::BackendToClient, DirectionEnd::WriteFailed(_)) => CloseReason::ClientError,
    }
}

// ── Forwarding loop ───────────────────────────────────────────────────────────

/// Forwards messages from `source` to `dest` until the direction ends.
///
/// Runs until the source closes, a read fails, or a write fails; the returned
/// [`DirectionEnd`] says which. The caller owns teardown: this function never
/// closes either connection itself.
///
/// Ordering: messages are read and written one at a time from a single loop,
/// so the destination observes them in exactly the order the source produced
/// them. Backpressure from a slow destination suspends the loop in
/// `send().await`.
pub async fn forward<S, K>(
    source: &mut S,
    dest: &mut K,
    direction: Direction,
    session_id: &str,
) -> DirectionEnd
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
    K: Sink<Message, Error = WsError> + Unpin,
{
    loop {
        let msg = match source.next().await {
            Some(Ok(msg)) => msg,
            Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                debug!("session {session_id}: {direction} source already closed");
                return DirectionEnd::SourceClosed;
            }
            Some(Err(WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake))) => {
                // Peer dropped the TCP connection without a Close frame.
                debug!("session {session_id}: {direction} source reset without close");
                return DirectionEnd::SourceClosed;
            }
            Some(Err(e)) => return DirectionEnd::ReadFailed(e),
            None => {
                debug!("session {session_id}: {direction} source stream ended");
                return DirectionEnd::SourceClosed;
            }
        };

        match msg {
            Message::Text(_) | Message::Binary(_) => {
                trace!(
                    "session {session_id}: {direction} forwarding {} bytes",
                    msg.len()
                );
                if let Err(e) = dest.send(msg).await {
                    return DirectionEnd::WriteFailed(e);
                }
            }
            Message::Close(frame) => {
                debug!("session {session_id}: {direction} received Close ({frame:?})");
                return DirectionEnd::SourceClosed;
            }
            Message::Ping(_) | Message::Pong(_) => {
                // Keepalive for this hop only; the library replies to pings.
                trace!("session {session_id}: {direction} control frame (not forwarded)");
            }
            Message::Frame(_) => {
                // Raw frames never surface from a read; ignore defensively.
                trace!("session {session_id}: {direction} raw frame (ignored)");
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
