//! Frame type.
//!
//! A frame is one complete message cut out of the byte stream. Its bytes
//! are opaque to this crate and shared via `bytes::Bytes`, so cloning a
//! frame never copies the payload.

use std::ops::Deref;

use bytes::Bytes;

/// One complete, delimited message. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Frame {
    payload: Bytes,
}

impl Frame {
    /// Create a frame from shared bytes (zero-copy).
    pub fn new(payload: Bytes) -> Self {
        Self { payload }
    }

    /// Create a frame by copying a slice.
    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self {
            payload: Bytes::copy_from_slice(data),
        }
    }

    /// Empty frame.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Consume the frame, returning its bytes.
    pub fn into_bytes(self) -> Bytes {
        self.payload
    }
}

impl Deref for Frame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.payload
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.payload
    }
}

impl From<Bytes> for Frame {
    fn from(payload: Bytes) -> Self {
        Self::new(payload)
    }
}

impl From<Vec<u8>> for Frame {
    fn from(payload: Vec<u8>) -> Self {
        Self::new(Bytes::from(payload))
    }
}

impl From<&'static [u8]> for Frame {
    fn from(payload: &'static [u8]) -> Self {
        Self::new(Bytes::from_static(payload))
    }
}

impl<const N: usize> From<&'static [u8; N]> for Frame {
    fn from(payload: &'static [u8; N]) -> Self {
        Self::new(Bytes::from_static(payload))
    }
}

impl PartialEq<[u8]> for Frame {
    fn eq(&self, other: &[u8]) -> bool {
        self.payload() == other
    }
}

impl PartialEq<&[u8]> for Frame {
    fn eq(&self, other: &&[u8]) -> bool {
        self.payload() == *other
    }
}
