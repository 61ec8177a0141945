//! SLIP framing - alphabet, encoder, streaming decoder, frame type.
//!
//! This module has no I/O awareness:
//! - [`SlipEncoder`] turns a frame into wire bytes
//! - [`SlipDecoder`] turns arbitrary chunks of wire bytes back into frames
//! - [`Frame`] is the opaque message passed between the two
//!
//! For every byte sequence `f`, `decode(&encode(&f))` yields exactly `[f]`.

mod alphabet;
mod decoder;
mod encode;
mod frame;

pub use alphabet::{SlipAlphabet, END, ESC, ESC_END, ESC_ESC};
pub use decoder::{decode, Frames, SlipDecoder, DEFAULT_MAX_FRAME_SIZE};
pub use encode::{encode, SlipEncoder};
pub use frame::Frame;
