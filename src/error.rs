//! Error types for spslip.

use thiserror::Error;

/// Malformed input seen by the SLIP decoder.
///
/// Framing errors are recovered inside the decoder: the damaged frame is
/// dropped and decoding resumes at the next `END` byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FramingError {
    /// An `ESC` byte was followed by something other than `ESC_END`/`ESC_ESC`.
    #[error("invalid escape sequence: ESC followed by {byte:#04x}")]
    InvalidEscape { byte: u8 },

    /// Input ended right after an `ESC` byte.
    #[error("trailing escape byte at end of input")]
    TrailingEscape,

    /// Input ended inside a frame that was never terminated.
    #[error("unterminated frame ({len} bytes) at end of input")]
    Truncated { len: usize },

    /// A frame grew past the configured limit.
    #[error("frame exceeds maximum size of {limit} bytes")]
    Oversized { limit: usize },
}

/// Main error type for connection operations.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// I/O error on the underlying stream. The connection is closed.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Operation attempted on a closed (or closing) connection.
    #[error("connection closed")]
    Closed,

    /// Outbound queue is full (only from non-waiting sends).
    #[error("outbound queue full")]
    QueueFull,

    /// API used in a way the contract forbids.
    #[error("protocol misuse: {0}")]
    ProtocolMisuse(&'static str),

    /// Invalid transport configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// JSON configuration could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConnectionError {
    /// True for errors that closed (or found closed) the connection.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionError::Transport(_) | ConnectionError::Closed)
    }
}

/// Result type alias using ConnectionError.
pub type Result<T> = std::result::Result<T, ConnectionError>;
