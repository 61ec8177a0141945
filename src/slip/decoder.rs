//! Streaming SLIP decoder.
//!
//! Uses `bytes::BytesMut` for the assembly buffer. Raw input is appended by
//! [`SlipDecoder::feed`] and consumed lazily by the returned iterator, one
//! frame at a time. A small state machine tracks where the scan is:
//! - `Data`: copying frame bytes, waiting for `END` or `ESC`
//! - `Escape`: saw `ESC`, the next byte must be a substitute
//! - `Discard`: the current frame is damaged, skip to the next `END`
//!
//! # Example
//!
//! ```
//! use spslip::slip::SlipDecoder;
//!
//! let mut decoder = SlipDecoder::default();
//!
//! // A frame split across two reads
//! assert_eq!(decoder.feed(b"hel").count(), 0);
//! let frames: Vec<_> = decoder.feed(b"lo\xC0").collect();
//!
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].as_ref().unwrap().payload(), b"hello");
//! ```

use bytes::{Buf, BufMut, BytesMut};

use super::alphabet::SlipAlphabet;
use super::Frame;
use crate::error::FramingError;

/// Default maximum decoded frame size (64 KiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// Parsing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Data,
    Escape,
    Discard,
}

/// Turns an unbounded byte stream into frames.
///
/// One instance serves exactly one stream. Not reentrant: the iterator
/// returned by `feed` borrows the decoder mutably.
#[derive(Debug)]
pub struct SlipDecoder {
    alphabet: SlipAlphabet,
    /// Raw bytes not yet scanned.
    input: BytesMut,
    /// Decoded bytes of the frame in progress.
    frame: BytesMut,
    state: State,
    max_frame_size: usize,
    skip_empty: bool,
}

impl SlipDecoder {
    /// Create a decoder for the given alphabet.
    pub fn new(alphabet: SlipAlphabet) -> Self {
        Self {
            alphabet,
            input: BytesMut::with_capacity(4 * 1024),
            frame: BytesMut::new(),
            state: State::Data,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            skip_empty: false,
        }
    }

    /// Set the largest frame (after unescaping) the decoder accepts.
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Drop empty frames instead of yielding them.
    pub fn skip_empty_frames(mut self, skip: bool) -> Self {
        self.skip_empty = skip;
        self
    }

    /// Push newly arrived bytes and iterate the frames they complete.
    ///
    /// Frames come out in arrival order. Bytes of an unterminated frame stay
    /// buffered for the next call, and so does anything the iterator was not
    /// driven over before being dropped.
    pub fn feed(&mut self, data: &[u8]) -> Frames<'_> {
        self.input.extend_from_slice(data);
        Frames { decoder: self }
    }

    /// Signal end of stream.
    ///
    /// Reports a trailing escape or an unterminated frame, then resets the
    /// decoder. Unscanned input left behind by a dropped iterator is
    /// discarded too.
    pub fn finish(&mut self) -> Result<(), FramingError> {
        let result = match self.state {
            State::Escape => Err(FramingError::TrailingEscape),
            State::Data if !self.frame.is_empty() || !self.input.is_empty() => {
                Err(FramingError::Truncated {
                    len: self.frame.len() + self.input.len(),
                })
            }
            _ => Ok(()),
        };
        self.clear();
        result
    }

    /// Number of bytes held for frames not yet complete.
    pub fn buffered_len(&self) -> usize {
        self.input.len() + self.frame.len()
    }

    /// True if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buffered_len() == 0
    }

    /// Clear all buffered bytes and reset state.
    pub fn clear(&mut self) {
        self.input.clear();
        self.frame.clear();
        self.state = State::Data;
    }

    /// Scan input until one frame or one error is produced.
    ///
    /// Returns `None` once the scanned input is exhausted.
    fn next_item(&mut self) -> Option<Result<Frame, FramingError>> {
        let a = self.alphabet;
        let mut consumed = 0;
        let mut item = None;

        for &byte in self.input.iter() {
            consumed += 1;

            match self.state {
                State::Discard => {
                    if byte == a.end {
                        self.state = State::Data;
                    }
                }

                State::Escape => match a.unescape(byte) {
                    Some(literal) => {
                        if self.frame.len() >= self.max_frame_size {
                            self.frame.clear();
                            self.state = State::Discard;
                            item = Some(Err(FramingError::Oversized {
                                limit: self.max_frame_size,
                            }));
                            break;
                        }
                        self.frame.put_u8(literal);
                        self.state = State::Data;
                    }
                    None => {
                        self.frame.clear();
                        // END after ESC is already the resync point
                        self.state = if byte == a.end {
                            State::Data
                        } else {
                            State::Discard
                        };
                        item = Some(Err(FramingError::InvalidEscape { byte }));
                        break;
                    }
                },

                State::Data => {
                    if byte == a.end {
                        if self.frame.is_empty() && self.skip_empty {
                            continue;
                        }
                        item = Some(Ok(Frame::new(self.frame.split().freeze())));
                        break;
                    } else if byte == a.esc {
                        self.state = State::Escape;
                    } else {
                        if self.frame.len() >= self.max_frame_size {
                            self.frame.clear();
                            self.state = State::Discard;
                            item = Some(Err(FramingError::Oversized {
                                limit: self.max_frame_size,
                            }));
                            break;
                        }
                        self.frame.put_u8(byte);
                    }
                }
            }
        }

        self.input.advance(consumed);
        item
    }

    /// Get the current state for debugging.
    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::Data => "Data",
            State::Escape => "Escape",
            State::Discard => "Discard",
        }
    }
}

impl Default for SlipDecoder {
    fn default() -> Self {
        Self::new(SlipAlphabet::default())
    }
}

/// Lazy sequence of decoded frames, returned by [`SlipDecoder::feed`].
#[derive(Debug)]
pub struct Frames<'a> {
    decoder: &'a mut SlipDecoder,
}

impl Iterator for Frames<'_> {
    type Item = Result<Frame, FramingError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.decoder.next_item()
    }
}

/// Decode a complete byte sequence with the RFC 1055 alphabet.
///
/// Equivalent to one `feed` followed by `finish`; a trailing escape or an
/// unterminated tail shows up as the last item.
pub fn decode(data: &[u8]) -> Vec<Result<Frame, FramingError>> {
    let mut decoder = SlipDecoder::default().with_max_frame_size(usize::MAX);
    let mut items: Vec<_> = decoder.feed(data).collect();
    if let Err(e) = decoder.finish() {
        items.push(Err(e));
    }
    items
}
