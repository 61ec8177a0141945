//! Upward delivery of frames and close notifications.
//!
//! A [`FrameSink`] is called from the connection's read task. Calls for one
//! connection never overlap and arrive in stream order. Callbacks are
//! synchronous; to reply from inside `on_frame` use
//! [`ConnectionRef::try_send`] or spawn a task that awaits
//! [`ConnectionRef::send`].

use tokio::sync::mpsc;

use super::{CloseReason, ConnectionId, ConnectionRef};
use crate::slip::Frame;

/// Receiver of decoded frames (the protocol layer).
pub trait FrameSink: Send + Sync + 'static {
    /// One complete frame from `conn`.
    ///
    /// `conn.close()` may be called from here.
    fn on_frame(&self, conn: &ConnectionRef, frame: Frame);

    /// The connection reached `Closed`. Called exactly once.
    fn on_closed(&self, id: ConnectionId, reason: &CloseReason) {
        let _ = (id, reason);
    }
}

/// Event forwarded by [`ChannelSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Frame { id: ConnectionId, frame: Frame },
    Closed { id: ConnectionId, reason: CloseReason },
}

impl ConnectionEvent {
    pub fn id(&self) -> ConnectionId {
        match self {
            ConnectionEvent::Frame { id, .. } | ConnectionEvent::Closed { id, .. } => *id,
        }
    }
}

/// Sink that turns callbacks into channel messages.
///
/// Several connections may share one `ChannelSink`; events carry the id.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ConnectionEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver its events go to.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: ConnectionEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Event receiver dropped, discarding event");
        }
    }
}

impl FrameSink for ChannelSink {
    fn on_frame(&self, conn: &ConnectionRef, frame: Frame) {
        self.forward(ConnectionEvent::Frame {
            id: conn.id(),
            frame,
        });
    }

    fn on_closed(&self, id: ConnectionId, reason: &CloseReason) {
        self.forward(ConnectionEvent::Closed {
            id,
            reason: reason.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_sink_forwards_closed() {
        let (sink, mut rx) = ChannelSink::new();
        let id = ConnectionId::next();

        sink.on_closed(id, &CloseReason::PeerClosed);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.id(), id);
        assert_eq!(
            event,
            ConnectionEvent::Closed {
                id,
                reason: CloseReason::PeerClosed
            }
        );
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.on_closed(ConnectionId::next(), &CloseReason::Local);
    }
}
