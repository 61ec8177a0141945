//! Connection over any split async byte stream.
//!
//! [`FramedConnection`] carries the whole lifecycle: the writer task, the
//! read task and the state machine. Concrete transports wrap it and only
//! add what is specific to their medium.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use spslip::{ChannelSink, Connection, FramedConnection, TransportConfig};
//!
//! let (near, far) = tokio::io::duplex(4096);
//! let conn = FramedConnection::from_stream(near, TransportConfig::default())?;
//!
//! let (sink, mut events) = ChannelSink::new();
//! conn.establish_read_channel(Arc::new(sink))?;
//! conn.send(b"ping".into()).await?;
//! ```

use std::sync::{Arc, Weak};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::{mpsc, watch};

use super::shared::{BoxedReader, ConnectionRef, ReleaseHandle, Shared};
use super::sink::FrameSink;
use super::stats::{ConnectionStats, Counters};
use super::writer::{enqueue, spawn_writer_task};
use super::{CloseReason, Connection, ConnectionId, ConnectionState};
use crate::config::TransportConfig;
use crate::error::Result;
use crate::slip::{Frame, SlipDecoder};

/// A framed connection over a generic byte stream.
///
/// Must be created inside a tokio runtime: the writer task starts right
/// away. Dropping the value closes the connection.
pub struct FramedConnection {
    shared: Arc<Shared>,
}

impl FramedConnection {
    /// Wrap separate read and write halves.
    pub fn new<R, W>(reader: R, writer: W, config: TransportConfig) -> Result<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::with_handle(Box::new(reader), writer, config, ReleaseHandle::Stream)
    }

    /// Wrap a bidirectional stream.
    pub fn from_stream<S>(stream: S, config: TransportConfig) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(reader, writer, config)
    }

    pub(crate) fn with_handle<W>(
        reader: BoxedReader,
        writer: W,
        config: TransportConfig,
        handle: ReleaseHandle,
    ) -> Result<Self>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        config.validate()?;

        let id = ConnectionId::next();
        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let shared = Arc::new(Shared::new(id, config, reader, tx, handle));

        let task = spawn_writer_task(
            id,
            writer,
            rx,
            Arc::downgrade(&shared),
            shared.close_signal(),
            shared.counters(),
        );
        shared.attach_writer_task(task);

        tracing::debug!(conn = %id, "Connection opened");
        Ok(Self { shared })
    }

    /// Weak handle for callbacks and other tasks.
    pub fn connection_ref(&self) -> ConnectionRef {
        ConnectionRef::new(&self.shared)
    }

    pub fn config(&self) -> &TransportConfig {
        self.shared.config()
    }

    /// Close after the frames already queued have been written.
    ///
    /// New sends fail and delivery stops as soon as this is called. The
    /// write half is shut down once the queue is empty, then the
    /// connection is closed as by [`close`](Connection::close).
    pub async fn close_graceful(&self) -> Result<()> {
        if let Some(writer_task) = self.shared.begin_closing() {
            if let Err(e) = writer_task.await {
                tracing::warn!(conn = %self.id(), error = %e, "Writer task ended abnormally");
            }
        }
        self.shared.close_with(CloseReason::Local)
    }
}

impl Connection for FramedConnection {
    fn id(&self) -> ConnectionId {
        self.shared.id()
    }

    fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    fn send(&self, frame: Frame) -> impl std::future::Future<Output = Result<()>> + Send {
        let prepared = self.shared.prepare_send(&frame);
        async move {
            let (tx, bytes) = prepared?;
            enqueue(tx, bytes).await
        }
    }

    fn establish_read_channel(&self, sink: Arc<dyn FrameSink>) -> Result<()> {
        let (reader, closed) = self.shared.begin_reading(sink)?;

        tokio::spawn(read_loop(
            self.id(),
            reader,
            Arc::downgrade(&self.shared),
            self.shared.config().decoder(),
            closed,
            self.shared.counters(),
            self.shared.config().read_buffer_size,
        ));

        tracing::debug!(conn = %self.id(), "Read channel established");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.shared.close_with(CloseReason::Local)
    }

    fn stats(&self) -> ConnectionStats {
        self.shared.stats()
    }
}

impl Drop for FramedConnection {
    fn drop(&mut self) {
        let _ = self.shared.close_with(CloseReason::Dropped);
    }
}

impl std::fmt::Debug for FramedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedConnection")
            .field("id", &self.shared.id())
            .field("state", &self.shared.state())
            .finish()
    }
}

/// Main read loop - reads chunks, decodes frames, delivers them.
///
/// Holds the connection only through `shared`; each chunk upgrades it for
/// the duration of the delivery and never across an await.
async fn read_loop(
    id: ConnectionId,
    mut reader: BoxedReader,
    shared: Weak<Shared>,
    mut decoder: SlipDecoder,
    mut closed: watch::Receiver<bool>,
    counters: Arc<Counters>,
    buffer_size: usize,
) {
    let mut buf = vec![0u8; buffer_size];

    let reason = loop {
        let read = tokio::select! {
            biased;
            _ = closed.changed() => return,
            read = reader.read(&mut buf) => read,
        };

        let n = match read {
            Ok(0) => {
                if let Err(e) = decoder.finish() {
                    counters.record_framing_error();
                    tracing::debug!(conn = %id, error = %e, "Discarding partial frame at end of stream");
                }
                break CloseReason::PeerClosed;
            }
            Ok(n) => n,
            Err(e) => {
                tracing::error!(conn = %id, error = %e, "Read failed, closing connection");
                break CloseReason::from(&e);
            }
        };

        let Some(conn) = shared.upgrade() else {
            return;
        };
        // Late completion after close: drop the bytes untouched
        if conn.delivery_sink().is_none() {
            tracing::trace!(conn = %id, bytes = n, "Discarding read after close");
            return;
        }
        counters.record_read(n);

        let conn_ref = ConnectionRef::new(&conn);
        for item in decoder.feed(&buf[..n]) {
            match item {
                Ok(frame) => {
                    // A close on another thread waits for this frame
                    let _delivery = conn.delivery_guard();
                    let Some(sink) = conn.delivery_sink() else {
                        return;
                    };
                    counters.record_delivered();
                    sink.on_frame(&conn_ref, frame);
                }
                Err(e) => {
                    counters.record_framing_error();
                    tracing::warn!(conn = %id, error = %e, "Dropped malformed frame");
                }
            }
        }
    };

    if let Some(conn) = shared.upgrade() {
        let _ = conn.close_with(reason);
    }
}
