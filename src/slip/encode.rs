//! SLIP encoder.
//!
//! Encoding is a total function: every byte sequence, including the empty
//! one, has exactly one encoding.
//!
//! # Example
//!
//! ```
//! use spslip::slip::encode;
//!
//! let wire = encode(&[0x01, 0xC0, 0xDB, 0x02]);
//! assert_eq!(&wire[..], &[0x01, 0xDB, 0xDC, 0xDB, 0xDD, 0x02, 0xC0]);
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::alphabet::SlipAlphabet;

/// Encodes frames for the wire.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlipEncoder {
    alphabet: SlipAlphabet,
    leading_end: bool,
}

impl SlipEncoder {
    /// Encoder for the given alphabet.
    pub fn new(alphabet: SlipAlphabet) -> Self {
        Self {
            alphabet,
            leading_end: false,
        }
    }

    /// Also emit an `END` before each frame.
    ///
    /// Some peers do this to flush line noise. Receivers then see an empty
    /// frame in front of every real one unless they skip empty frames.
    pub fn with_leading_end(mut self, leading_end: bool) -> Self {
        self.leading_end = leading_end;
        self
    }

    pub fn alphabet(&self) -> &SlipAlphabet {
        &self.alphabet
    }

    /// Exact number of bytes `encode` produces for `frame`.
    pub fn encoded_len(&self, frame: &[u8]) -> usize {
        let specials = frame.iter().filter(|&&b| self.alphabet.is_special(b)).count();
        frame.len() + specials + 1 + usize::from(self.leading_end)
    }

    /// Encode one frame into a new buffer.
    pub fn encode(&self, frame: &[u8]) -> Bytes {
        let mut out = BytesMut::with_capacity(self.encoded_len(frame));
        self.encode_into(frame, &mut out);
        out.freeze()
    }

    /// Append the encoding of one frame to `out`.
    pub fn encode_into(&self, frame: &[u8], out: &mut BytesMut) {
        let a = &self.alphabet;
        out.reserve(self.encoded_len(frame));

        if self.leading_end {
            out.put_u8(a.end);
        }

        // Copy runs of plain bytes in one go
        let mut run_start = 0;
        for (i, &byte) in frame.iter().enumerate() {
            if a.is_special(byte) {
                out.extend_from_slice(&frame[run_start..i]);
                out.put_u8(a.esc);
                out.put_u8(a.substitute(byte));
                run_start = i + 1;
            }
        }
        out.extend_from_slice(&frame[run_start..]);

        out.put_u8(a.end);
    }
}

/// Encode one frame with the RFC 1055 alphabet.
pub fn encode(frame: &[u8]) -> Bytes {
    SlipEncoder::default().encode(frame)
}
