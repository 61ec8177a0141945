//! Dedicated writer task for one connection.
//!
//! Senders never touch the write half. They push encoded frames into an
//! mpsc channel; the writer task drains it, batches whatever is ready into
//! one vectored write, and acknowledges each frame once its bytes are on
//! the medium.
//!
//! ```text
//! send() ─┐
//! send() ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► write half
//! send() ─┘
//! ```
//!
//! Frames leave in channel order. Partial writes are continued from the
//! exact byte where the medium stopped.

use std::io::{self, IoSlice};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::shared::Shared;
use super::stats::Counters;
use super::{CloseReason, ConnectionId};
use crate::error::{ConnectionError, Result};

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// Encoded frame waiting for the writer.
#[derive(Debug)]
pub(crate) struct OutboundFrame {
    bytes: Bytes,
    ack: Option<oneshot::Sender<Result<()>>>,
}

impl OutboundFrame {
    /// Frame whose sender waits for the write result.
    pub(crate) fn acked(bytes: Bytes) -> (Self, oneshot::Receiver<Result<()>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                bytes,
                ack: Some(tx),
            },
            rx,
        )
    }

    /// Fire-and-forget frame.
    pub(crate) fn unacked(bytes: Bytes) -> Self {
        Self { bytes, ack: None }
    }

    #[inline]
    fn size(&self) -> usize {
        self.bytes.len()
    }

    fn complete(self, result: Result<()>) {
        if let Some(ack) = self.ack {
            // Sender gave up waiting; nothing to report to
            let _ = ack.send(result);
        }
    }
}

/// Queue one frame and wait until the writer has written it.
pub(crate) async fn enqueue(tx: mpsc::Sender<OutboundFrame>, bytes: Bytes) -> Result<()> {
    let (frame, ack) = OutboundFrame::acked(bytes);
    tx.send(frame).await.map_err(|_| ConnectionError::Closed)?;
    drop(tx);
    // Dropped ack means the frame was discarded by a close
    ack.await.map_err(|_| ConnectionError::Closed)?
}

/// Spawn the writer task for `writer`.
pub(crate) fn spawn_writer_task<W>(
    id: ConnectionId,
    writer: W,
    rx: mpsc::Receiver<OutboundFrame>,
    shared: Weak<Shared>,
    closed: watch::Receiver<bool>,
    counters: Arc<Counters>,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(writer_loop(id, rx, writer, shared, closed, counters))
}

/// Main writer loop - receives frames and writes them to the stream.
///
/// Ends when the channel closes (graceful drain), when the connection is
/// closed, or on the first write error.
async fn writer_loop<W>(
    id: ConnectionId,
    mut rx: mpsc::Receiver<OutboundFrame>,
    mut writer: W,
    shared: Weak<Shared>,
    mut closed: watch::Receiver<bool>,
    counters: Arc<Counters>,
) where
    W: AsyncWrite + Unpin,
{
    let failure = loop {
        // Close wins over queued frames
        let first = tokio::select! {
            biased;
            _ = closed.changed() => break None,
            next = rx.recv() => match next {
                Some(frame) => frame,
                None => break None,
            },
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        match write_batch(&mut writer, &batch).await {
            Ok(written) => {
                counters.record_written(batch.len(), written);
                for frame in batch {
                    frame.complete(Ok(()));
                }
            }
            Err(e) => {
                for frame in batch {
                    let err = io::Error::new(e.kind(), e.to_string());
                    frame.complete(Err(ConnectionError::Transport(err)));
                }
                break Some(e);
            }
        }
    };

    // Anything still queued is dropped; its senders observe Closed
    drop(rx);

    match failure {
        None => {
            if let Err(e) = writer.shutdown().await {
                tracing::debug!(conn = %id, error = %e, "Write half shutdown failed");
            }
            tracing::trace!(conn = %id, "Writer task finished");
        }
        Some(e) => {
            if *closed.borrow() {
                tracing::debug!(conn = %id, error = %e, "Write failed after close");
                return;
            }
            tracing::error!(conn = %id, error = %e, "Write failed, closing connection");
            if let Some(shared) = shared.upgrade() {
                let _ = shared.close_with(CloseReason::from(&e));
            }
        }
    }
}

/// Write a batch of frames using scatter/gather I/O (write_vectored).
///
/// Returns the number of bytes written, which is always the batch total.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> io::Result<usize>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = batch.iter().map(OutboundFrame::size).sum();
    if total_size == 0 {
        return Ok(0);
    }

    let mut total_written = 0;
    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            ));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(total_written)
}

/// Build IoSlice array for the data not yet written.
fn build_remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len());
    let mut offset = 0;

    for frame in batch {
        let end = offset + frame.size();
        if skip_bytes < end && !frame.bytes.is_empty() {
            let start_in_frame = skip_bytes.saturating_sub(offset);
            slices.push(IoSlice::new(&frame.bytes[start_in_frame..]));
        }
        offset = end;
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt};

    fn frame(data: &'static [u8]) -> OutboundFrame {
        OutboundFrame::unacked(Bytes::from_static(data))
    }

    /// Writer that accepts at most `limit` bytes per call.
    struct Trickle {
        out: Vec<u8>,
        limit: usize,
    }

    impl AsyncWrite for Trickle {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let n = buf.len().min(self.limit);
            self.out.extend_from_slice(&buf[..n]);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Writer that always fails.
    struct Broken;

    impl AsyncWrite for Broken {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[test]
    fn test_build_remaining_slices_no_skip() {
        let batch = vec![frame(b"abc"), frame(b"de")];
        let slices = build_remaining_slices(&batch, 0);
        assert_eq!(slices.len(), 2);
        assert_eq!(&*slices[0], b"abc");
    }

    #[test]
    fn test_build_remaining_slices_mid_frame() {
        let batch = vec![frame(b"abc"), frame(b"de")];
        let slices = build_remaining_slices(&batch, 2);
        assert_eq!(slices.len(), 2);
        assert_eq!(&*slices[0], b"c");
        assert_eq!(&*slices[1], b"de");
    }

    #[test]
    fn test_build_remaining_slices_skip_whole_frame() {
        let batch = vec![frame(b"abc"), frame(b"de")];
        let slices = build_remaining_slices(&batch, 3);
        assert_eq!(slices.len(), 1);
        assert_eq!(&*slices[0], b"de");
    }

    #[tokio::test]
    async fn test_write_batch_multiple() {
        let mut buf = Cursor::new(Vec::new());
        let batch = vec![frame(b"one\xC0"), frame(b"two\xC0")];

        let written = write_batch(&mut buf, &batch).await.unwrap();

        assert_eq!(written, 8);
        assert_eq!(buf.into_inner(), b"one\xC0two\xC0");
    }

    #[tokio::test]
    async fn test_write_batch_retries_partial_writes() {
        let mut out = Trickle {
            out: Vec::new(),
            limit: 3,
        };
        let batch = vec![frame(b"hello\xC0"), frame(b"world\xC0")];

        write_batch(&mut out, &batch).await.unwrap();

        assert_eq!(out.out, b"hello\xC0world\xC0");
    }

    #[tokio::test]
    async fn test_write_batch_reports_error() {
        let batch = vec![frame(b"x\xC0")];
        let err = write_batch(&mut Broken, &batch).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_writer_task_acks_in_order() {
        let (client, mut server) = duplex(4096);
        let (tx, rx) = mpsc::channel(16);
        let (_closed_tx, closed_rx) = watch::channel(false);
        let counters = Arc::new(Counters::default());

        let _task = spawn_writer_task(
            ConnectionId::next(),
            client,
            rx,
            Weak::new(),
            closed_rx,
            counters.clone(),
        );

        let frames: [&'static [u8]; 3] = [b"a\xC0", b"b\xC0", b"c\xC0"];
        for data in frames {
            enqueue(tx.clone(), Bytes::from_static(data)).await.unwrap();
        }

        let mut buf = vec![0u8; 6];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, b"a\xC0b\xC0c\xC0");
        assert_eq!(counters.snapshot().frames_sent, 3);
        assert_eq!(counters.snapshot().bytes_sent, 6);
    }

    #[tokio::test]
    async fn test_writer_task_stops_on_close_signal() {
        let (client, _server) = duplex(4096);
        let (tx, rx) = mpsc::channel(16);
        let (closed_tx, closed_rx) = watch::channel(false);

        let task = spawn_writer_task(
            ConnectionId::next(),
            client,
            rx,
            Weak::new(),
            closed_rx,
            Arc::new(Counters::default()),
        );

        closed_tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();

        let result = enqueue(tx, Bytes::from_static(b"late\xC0")).await;
        assert!(matches!(result, Err(ConnectionError::Closed)));
    }

    #[tokio::test]
    async fn test_writer_task_drains_then_shuts_down() {
        let (client, mut server) = duplex(4096);
        let (tx, rx) = mpsc::channel(16);
        let (_closed_tx, closed_rx) = watch::channel(false);

        let task = spawn_writer_task(
            ConnectionId::next(),
            client,
            rx,
            Weak::new(),
            closed_rx,
            Arc::new(Counters::default()),
        );

        tx.send(frame(b"last\xC0")).await.unwrap();
        drop(tx);
        task.await.unwrap();

        let mut out = Vec::new();
        server.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"last\xC0");
    }

    #[tokio::test]
    async fn test_writer_task_fails_pending_sender() {
        let (tx, rx) = mpsc::channel(16);
        let (_closed_tx, closed_rx) = watch::channel(false);

        let _task = spawn_writer_task(
            ConnectionId::next(),
            Broken,
            rx,
            Weak::new(),
            closed_rx,
            Arc::new(Counters::default()),
        );

        let result = enqueue(tx, Bytes::from_static(b"x\xC0")).await;
        assert!(matches!(result, Err(ConnectionError::Transport(_))));
    }
}
