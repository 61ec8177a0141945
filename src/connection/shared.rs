//! State shared between a connection, its tasks and its weak handles.

use std::io;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::sink::FrameSink;
use super::stats::{ConnectionStats, Counters};
use super::writer::{enqueue, OutboundFrame};
use super::{CloseReason, ConnectionId, ConnectionState};
use crate::config::TransportConfig;
use crate::error::{ConnectionError, Result};
use crate::slip::{Frame, SlipEncoder};

/// Read half waiting for `establish_read_channel`.
pub(crate) type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// What `close()` has to release beyond the stream halves.
pub(crate) enum ReleaseHandle {
    /// Halves are released by the tasks that own them.
    Stream,
    /// Duplicate of the socket, used to shut it down synchronously.
    #[cfg(feature = "tcp")]
    Socket(socket2::Socket),
    Released,
}

impl ReleaseHandle {
    fn release(self) -> io::Result<()> {
        match self {
            #[cfg(feature = "tcp")]
            ReleaseHandle::Socket(socket) => match socket.shutdown(std::net::Shutdown::Both) {
                // Peer already gone
                Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
                other => other,
            },
            ReleaseHandle::Stream | ReleaseHandle::Released => Ok(()),
        }
    }
}

/// Everything mutated on a state transition. Guarded by one lock.
struct Inner {
    state: ConnectionState,
    reader: Option<BoxedReader>,
    outbound: Option<mpsc::Sender<OutboundFrame>>,
    writer_task: Option<JoinHandle<()>>,
    sink: Option<Arc<dyn FrameSink>>,
    handle: ReleaseHandle,
}

pub(crate) struct Shared {
    id: ConnectionId,
    config: TransportConfig,
    encoder: SlipEncoder,
    inner: Mutex<Inner>,
    /// Held by the read task around each `on_frame` and by every state
    /// transition that stops delivery. Taken before `inner`, never after.
    delivery: ReentrantMutex<()>,
    closed: watch::Sender<bool>,
    counters: Arc<Counters>,
}

impl Shared {
    pub(crate) fn new(
        id: ConnectionId,
        config: TransportConfig,
        reader: BoxedReader,
        outbound: mpsc::Sender<OutboundFrame>,
        handle: ReleaseHandle,
    ) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            id,
            encoder: config.encoder(),
            config,
            inner: Mutex::new(Inner {
                state: ConnectionState::Open,
                reader: Some(reader),
                outbound: Some(outbound),
                writer_task: None,
                sink: None,
                handle,
            }),
            delivery: ReentrantMutex::new(()),
            closed,
            counters: Arc::new(Counters::default()),
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> ConnectionId {
        self.id
    }

    pub(crate) fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub(crate) fn counters(&self) -> Arc<Counters> {
        self.counters.clone()
    }

    pub(crate) fn stats(&self) -> ConnectionStats {
        self.counters.snapshot()
    }

    /// Receiver that fires when the connection is closed.
    pub(crate) fn close_signal(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    pub(crate) fn attach_writer_task(&self, task: JoinHandle<()>) {
        let mut inner = self.inner.lock();
        if inner.state == ConnectionState::Closed {
            // Closed before the task was recorded; it exits on its own
            return;
        }
        inner.writer_task = Some(task);
    }

    /// Encode `frame` and grab a sender, or fail if sends are not allowed.
    pub(crate) fn prepare_send(&self, frame: &Frame) -> Result<(mpsc::Sender<OutboundFrame>, Bytes)> {
        let tx = {
            let inner = self.inner.lock();
            if !inner.state.is_open() {
                return Err(ConnectionError::Closed);
            }
            inner.outbound.clone().ok_or(ConnectionError::Closed)?
        };
        Ok((tx, self.encoder.encode(frame)))
    }

    /// Switch to `Reading` and hand back the read half with a close signal.
    ///
    /// The signal is subscribed under the state lock, so a close racing
    /// with this call is either refused here or seen by the receiver.
    pub(crate) fn begin_reading(
        &self,
        sink: Arc<dyn FrameSink>,
    ) -> Result<(BoxedReader, watch::Receiver<bool>)> {
        let mut inner = self.inner.lock();
        match inner.state {
            ConnectionState::Open => {}
            ConnectionState::Reading => {
                return Err(ConnectionError::ProtocolMisuse(
                    "read channel already established",
                ))
            }
            ConnectionState::Closing | ConnectionState::Closed => {
                return Err(ConnectionError::Closed)
            }
        }
        let reader = inner.reader.take().ok_or(ConnectionError::ProtocolMisuse(
            "read half already taken",
        ))?;
        inner.sink = Some(sink);
        inner.state = ConnectionState::Reading;
        Ok((reader, self.closed.subscribe()))
    }

    /// Block state transitions that stop delivery until the guard drops.
    ///
    /// Re-entrant: a close from inside `on_frame` on the same thread goes
    /// straight through.
    pub(crate) fn delivery_guard(&self) -> ReentrantMutexGuard<'_, ()> {
        self.delivery.lock()
    }

    /// Sink to deliver to, checked under the state lock.
    ///
    /// `None` once the connection has left `Reading`; the caller must then
    /// drop whatever it was about to deliver. Call it while holding
    /// [`delivery_guard`](Self::delivery_guard).
    pub(crate) fn delivery_sink(&self) -> Option<Arc<dyn FrameSink>> {
        let inner = self.inner.lock();
        if inner.state == ConnectionState::Reading {
            inner.sink.clone()
        } else {
            None
        }
    }

    /// Enter `Closing`: refuse new sends and deliveries, let the writer drain.
    ///
    /// Returns the writer task to wait for, if this call started the drain.
    pub(crate) fn begin_closing(&self) -> Option<JoinHandle<()>> {
        let _delivery = self.delivery.lock();
        let mut inner = self.inner.lock();
        if !inner.state.is_open() {
            return None;
        }
        inner.state = ConnectionState::Closing;
        inner.outbound = None;
        tracing::debug!(conn = %self.id, "Connection closing");
        inner.writer_task.take()
    }

    /// Transition to `Closed`. Only the first call has any effect.
    ///
    /// Waits for an `on_frame` running on another thread to return, then
    /// flips the state under the lock, so the read task stands down before
    /// its next delivery. The sink is notified outside the state lock.
    pub(crate) fn close_with(&self, reason: CloseReason) -> Result<()> {
        let _delivery = self.delivery.lock();
        let (sink, handle) = {
            let mut inner = self.inner.lock();
            if inner.state == ConnectionState::Closed {
                return Ok(());
            }
            inner.state = ConnectionState::Closed;
            inner.outbound = None;
            inner.reader = None;
            inner.writer_task = None;
            let handle = std::mem::replace(&mut inner.handle, ReleaseHandle::Released);
            (inner.sink.take(), handle)
        };

        let released = handle.release();
        self.closed.send_replace(true);

        match &released {
            Ok(()) => tracing::debug!(conn = %self.id, %reason, "Connection closed"),
            Err(e) => tracing::warn!(
                conn = %self.id,
                %reason,
                error = %e,
                "Connection closed, socket shutdown failed"
            ),
        }

        if let Some(sink) = sink {
            sink.on_closed(self.id, &reason);
        }

        released.map_err(ConnectionError::Transport)
    }
}

/// Weak handle to a connection.
///
/// Handed to sinks and usable from any task. It never keeps the connection
/// alive: once the owner drops the connection every operation reports
/// `Closed`.
#[derive(Clone)]
pub struct ConnectionRef {
    id: ConnectionId,
    shared: Weak<Shared>,
}

impl ConnectionRef {
    pub(crate) fn new(shared: &Arc<Shared>) -> Self {
        Self {
            id: shared.id(),
            shared: Arc::downgrade(shared),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Current state; `Closed` if the connection no longer exists.
    pub fn state(&self) -> ConnectionState {
        self.shared
            .upgrade()
            .map_or(ConnectionState::Closed, |shared| shared.state())
    }

    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// Close the connection. Same contract as [`Connection::close`](super::Connection::close).
    pub fn close(&self) -> Result<()> {
        match self.shared.upgrade() {
            Some(shared) => shared.close_with(CloseReason::Local),
            None => Ok(()),
        }
    }

    /// Send a frame and wait until it is written.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        let (tx, bytes) = {
            let shared = self.shared.upgrade().ok_or(ConnectionError::Closed)?;
            shared.prepare_send(&frame)?
        };
        enqueue(tx, bytes).await
    }

    /// Queue a frame without waiting.
    ///
    /// Usable from synchronous callbacks. Write errors are not reported to
    /// the caller; they close the connection instead.
    pub fn try_send(&self, frame: Frame) -> Result<()> {
        let shared = self.shared.upgrade().ok_or(ConnectionError::Closed)?;
        let (tx, bytes) = shared.prepare_send(&frame)?;
        tx.try_send(OutboundFrame::unacked(bytes)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ConnectionError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => ConnectionError::Closed,
        })
    }
}

impl std::fmt::Debug for ConnectionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRef")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}
