//! SLIP special bytes.
//!
//! ```text
//! data byte END  ─►  ESC ESC_END
//! data byte ESC  ─►  ESC ESC_ESC
//! end of frame   ─►  END
//! ```
//!
//! The defaults are the RFC 1055 values. Both ends of a link must use the
//! same alphabet.

use serde::{Deserialize, Serialize};

use crate::error::{ConnectionError, Result};

/// Frame terminator (RFC 1055).
pub const END: u8 = 0xC0;
/// Escape introducer.
pub const ESC: u8 = 0xDB;
/// Follows `ESC` to stand for a literal `END`.
pub const ESC_END: u8 = 0xDC;
/// Follows `ESC` to stand for a literal `ESC`.
pub const ESC_ESC: u8 = 0xDD;

/// The four reserved byte values of the framing scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlipAlphabet {
    pub end: u8,
    pub esc: u8,
    pub esc_end: u8,
    pub esc_esc: u8,
}

impl SlipAlphabet {
    /// RFC 1055 alphabet.
    pub const RFC1055: SlipAlphabet = SlipAlphabet {
        end: END,
        esc: ESC,
        esc_end: ESC_END,
        esc_esc: ESC_ESC,
    };

    /// Check that the alphabet can be decoded unambiguously.
    ///
    /// `END` must never appear inside an encoded frame, so neither
    /// substitute may equal `END`; a substitute equal to `ESC` would make a
    /// literal escape undecodable.
    pub fn validate(&self) -> Result<()> {
        if self.end == self.esc {
            return Err(ConnectionError::Config(format!(
                "END and ESC must differ (both {:#04x})",
                self.end
            )));
        }
        if self.esc_end == self.esc_esc {
            return Err(ConnectionError::Config(format!(
                "ESC_END and ESC_ESC must differ (both {:#04x})",
                self.esc_end
            )));
        }
        for (name, sub) in [("ESC_END", self.esc_end), ("ESC_ESC", self.esc_esc)] {
            if sub == self.end || sub == self.esc {
                return Err(ConnectionError::Config(format!(
                    "{} ({:#04x}) collides with END or ESC",
                    name, sub
                )));
            }
        }
        Ok(())
    }

    /// True if `byte` has to be escaped inside a frame.
    #[inline]
    pub fn is_special(&self, byte: u8) -> bool {
        byte == self.end || byte == self.esc
    }

    /// Substitute written after `ESC` for a special byte.
    #[inline]
    pub(crate) fn substitute(&self, byte: u8) -> u8 {
        if byte == self.end {
            self.esc_end
        } else {
            self.esc_esc
        }
    }

    /// Literal byte for an escape substitute, if it is one.
    #[inline]
    pub(crate) fn unescape(&self, sub: u8) -> Option<u8> {
        if sub == self.esc_end {
            Some(self.end)
        } else if sub == self.esc_esc {
            Some(self.esc)
        } else {
            None
        }
    }
}

impl Default for SlipAlphabet {
    fn default() -> Self {
        Self::RFC1055
    }
}
