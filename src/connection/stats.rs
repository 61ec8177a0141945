//! Per-connection traffic counters.
//!
//! Lock-free: the read task, the writer task and callers of `stats()` touch
//! them concurrently.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of a connection's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Frames delivered to the sink.
    pub frames_received: u64,
    /// Frames written to the medium.
    pub frames_sent: u64,
    /// Raw bytes read from the medium.
    pub bytes_received: u64,
    /// Encoded bytes written to the medium.
    pub bytes_sent: u64,
    /// Malformed or oversized frames dropped by the decoder.
    pub framing_errors: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    frames_received: AtomicU64,
    frames_sent: AtomicU64,
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
    framing_errors: AtomicU64,
}

impl Counters {
    #[inline]
    pub(crate) fn record_read(&self, bytes: usize) {
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_delivered(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_written(&self, frames: usize, bytes: usize) {
        self.frames_sent.fetch_add(frames as u64, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_framing_error(&self) {
        self.framing_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ConnectionStats {
        ConnectionStats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            framing_errors: self.framing_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_records() {
        let counters = Counters::default();
        counters.record_read(10);
        counters.record_delivered();
        counters.record_delivered();
        counters.record_written(3, 42);
        counters.record_framing_error();

        let stats = counters.snapshot();
        assert_eq!(stats.bytes_received, 10);
        assert_eq!(stats.frames_received, 2);
        assert_eq!(stats.frames_sent, 3);
        assert_eq!(stats.bytes_sent, 42);
        assert_eq!(stats.framing_errors, 1);
    }
}
