//! Connection contract and its transport variants.
//!
//! # Architecture
//!
//! ```text
//!              send()                       ┌─────────────┐
//! Owner ──────────────► mpsc ─► Writer Task ─►│             │
//!   │                                        │  byte       │
//!   │ establish_read_channel(sink)           │  stream     │
//!   ▼                                        │             │
//! FrameSink ◄── on_frame ◄── Read Task ◄──────│             │
//!                                            └─────────────┘
//! ```
//!
//! The owner holds the connection object itself. Both tasks and every
//! [`ConnectionRef`] hold only a `Weak` back-reference, so a connection is
//! destroyed as soon as its owner drops it. State changes go through one
//! lock, and the read task re-checks the state under that lock before each
//! delivery. Each `on_frame` runs under a re-entrant delivery guard that
//! `close()` also takes, so nothing is delivered once `close()` has
//! returned, whichever thread called it.

use std::fmt;
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::slip::Frame;

mod framed;
mod shared;
mod sink;
mod stats;
#[cfg(feature = "tcp")]
mod tcp;
mod writer;

pub use framed::FramedConnection;
pub use shared::ConnectionRef;
pub use sink::{ChannelSink, ConnectionEvent, FrameSink};
pub use stats::ConnectionStats;
#[cfg(feature = "tcp")]
pub use tcp::TcpConnection;

/// The capability set every transport provides.
///
/// Implementors are uniquely owned (not `Clone`); dropping one closes it
/// with [`CloseReason::Dropped`].
pub trait Connection: Send + Sync {
    /// Process-unique identifier.
    fn id(&self) -> ConnectionId;

    /// Current lifecycle state.
    fn state(&self) -> ConnectionState;

    /// Encode and transmit one frame.
    ///
    /// Resolves once the encoded bytes have been handed to the medium.
    /// Frames are written in the order `send` was called. Fails with
    /// [`Closed`](crate::ConnectionError::Closed) when the connection is not
    /// open and with [`Transport`](crate::ConnectionError::Transport) when
    /// the write fails (which also closes the connection).
    fn send(&self, frame: Frame) -> impl Future<Output = Result<()>> + Send;

    /// Start delivering inbound frames to `sink`, in arrival order.
    ///
    /// Returns immediately. Allowed exactly once per connection; a second
    /// call is a [`ProtocolMisuse`](crate::ConnectionError::ProtocolMisuse).
    fn establish_read_channel(&self, sink: Arc<dyn FrameSink>) -> Result<()>;

    /// Close the connection.
    ///
    /// Idempotent and safe to call from inside `on_frame`. Called from
    /// another thread while `on_frame` runs, it waits for that callback to
    /// return. When it returns the state is `Closed`, the transport handle
    /// is released and no more frames will be delivered.
    fn close(&self) -> Result<()>;

    /// Traffic counters.
    fn stats(&self) -> ConnectionStats;
}

/// Identifier assigned to every connection at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Lifecycle of a connection.
///
/// ```text
/// Open ──establish_read_channel──► Reading
///   │                                 │
///   ├──────── close / error ──────────┼──► Closed
///   │                                 │
///   └──── close_graceful ──► Closing ─┴──► Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Usable, no read channel yet.
    Open,
    /// Usable, frames are being delivered.
    Reading,
    /// Draining queued writes before closing. No sends, no deliveries.
    Closing,
    /// Terminal.
    Closed,
}

impl ConnectionState {
    /// True while `send` is accepted.
    pub fn is_open(self) -> bool {
        matches!(self, ConnectionState::Open | ConnectionState::Reading)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Open => "open",
            ConnectionState::Reading => "reading",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Why a connection reached `Closed`. Reported once via `on_closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// `close()` or `close_graceful()` was called.
    Local,
    /// The peer ended the stream.
    PeerClosed,
    /// A read or write failed.
    Transport { kind: io::ErrorKind, message: String },
    /// The owner dropped the connection without closing it.
    Dropped,
}

impl From<&io::Error> for CloseReason {
    fn from(err: &io::Error) -> Self {
        CloseReason::Transport {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Local => f.write_str("closed locally"),
            CloseReason::PeerClosed => f.write_str("closed by peer"),
            CloseReason::Transport { message, .. } => write!(f, "transport error: {}", message),
            CloseReason::Dropped => f.write_str("dropped by owner"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_ids_are_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
        assert_eq!(a.to_string(), format!("conn-{}", a.get()));
    }

    #[test]
    fn test_state_is_open() {
        assert!(ConnectionState::Open.is_open());
        assert!(ConnectionState::Reading.is_open());
        assert!(!ConnectionState::Closing.is_open());
        assert!(!ConnectionState::Closed.is_open());
    }

    #[test]
    fn test_close_reason_from_io_error() {
        let err = io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer");
        let reason = CloseReason::from(&err);
        assert_eq!(
            reason,
            CloseReason::Transport {
                kind: io::ErrorKind::ConnectionReset,
                message: "reset by peer".into(),
            }
        );
        assert_eq!(reason.to_string(), "transport error: reset by peer");
    }
}
