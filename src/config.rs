//! Transport configuration.
//!
//! Every field has a default, so a partial JSON document is enough:
//!
//! ```
//! use spslip::TransportConfig;
//!
//! let config = TransportConfig::from_json(r#"{ "max_frame_size": 1024 }"#).unwrap();
//! assert_eq!(config.max_frame_size, 1024);
//! assert_eq!(config.alphabet.end, 0xC0);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{ConnectionError, Result};
use crate::slip::{SlipAlphabet, SlipDecoder, SlipEncoder, DEFAULT_MAX_FRAME_SIZE};

/// Default read buffer size (64 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Default outbound queue capacity, in frames.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Settings shared by all connection variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Framing bytes. Both ends must agree.
    pub alphabet: SlipAlphabet,
    /// Largest decoded inbound frame; longer frames are dropped.
    pub max_frame_size: usize,
    /// Size of the buffer each socket read fills.
    pub read_buffer_size: usize,
    /// Outbound frames that may wait for the writer before `send` blocks.
    pub channel_capacity: usize,
    /// Emit an `END` before every outbound frame.
    pub leading_end: bool,
    /// Drop empty inbound frames.
    pub skip_empty_frames: bool,
}

impl TransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the framing alphabet.
    pub fn alphabet(mut self, alphabet: SlipAlphabet) -> Self {
        self.alphabet = alphabet;
        self
    }

    /// Set the maximum inbound frame size.
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Set the read buffer size.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set the outbound queue capacity.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn leading_end(mut self, enabled: bool) -> Self {
        self.leading_end = enabled;
        self
    }

    pub fn skip_empty_frames(mut self, enabled: bool) -> Self {
        self.skip_empty_frames = enabled;
        self
    }

    /// Check the configuration for values no connection can run with.
    pub fn validate(&self) -> Result<()> {
        self.alphabet.validate()?;
        if self.max_frame_size == 0 {
            return Err(ConnectionError::Config(
                "max_frame_size must be at least 1".into(),
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(ConnectionError::Config(
                "read_buffer_size must be at least 1".into(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ConnectionError::Config(
                "channel_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Encoder matching this configuration.
    pub fn encoder(&self) -> SlipEncoder {
        SlipEncoder::new(self.alphabet).with_leading_end(self.leading_end)
    }

    /// Fresh decoder matching this configuration.
    pub fn decoder(&self) -> SlipDecoder {
        SlipDecoder::new(self.alphabet)
            .with_max_frame_size(self.max_frame_size)
            .skip_empty_frames(self.skip_empty_frames)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            alphabet: SlipAlphabet::default(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            leading_end: false,
            skip_empty_frames: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = TransportConfig::default();
        assert_eq!(config.alphabet, SlipAlphabet::RFC1055);
        assert_eq!(config.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
        assert_eq!(config.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert!(!config.leading_end);
        assert!(!config.skip_empty_frames);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_chaining() {
        let config = TransportConfig::new()
            .max_frame_size(512)
            .read_buffer_size(128)
            .channel_capacity(8)
            .leading_end(true)
            .skip_empty_frames(true);

        assert_eq!(config.max_frame_size, 512);
        assert_eq!(config.read_buffer_size, 128);
        assert_eq!(config.channel_capacity, 8);
        assert!(config.leading_end);
        assert!(config.skip_empty_frames);
    }

    #[test]
    fn test_from_json_full() {
        let json = r#"{
            "alphabet": { "end": 126, "esc": 125, "esc_end": 94, "esc_esc": 93 },
            "max_frame_size": 2048,
            "read_buffer_size": 4096,
            "channel_capacity": 16,
            "leading_end": true,
            "skip_empty_frames": true
        }"#;

        let config = TransportConfig::from_json(json).unwrap();

        assert_eq!(config.alphabet.end, 0x7E);
        assert_eq!(config.alphabet.esc_esc, 0x5D);
        assert_eq!(config.max_frame_size, 2048);
        assert_eq!(config.channel_capacity, 16);
        assert!(config.leading_end);
    }

    #[test]
    fn test_from_json_rejects_invalid() {
        let err = TransportConfig::from_json(r#"{ "channel_capacity": 0 }"#).unwrap_err();
        assert!(matches!(err, ConnectionError::Config(_)));

        let err = TransportConfig::from_json(r#"{ "alphabet": { "esc": 192 } }"#).unwrap_err();
        assert!(matches!(err, ConnectionError::Config(_)));

        let err = TransportConfig::from_json("not json").unwrap_err();
        assert!(matches!(err, ConnectionError::Json(_)));
    }

    #[test]
    fn test_encoder_and_decoder_follow_config() {
        let config = TransportConfig::new().leading_end(true).skip_empty_frames(true);

        let wire = config.encoder().encode(b"hi");
        assert_eq!(&wire[..], b"\xC0hi\xC0");

        let mut decoder = config.decoder();
        let frames: Vec<_> = decoder.feed(&wire).collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref().unwrap().payload(), b"hi");
    }
}
