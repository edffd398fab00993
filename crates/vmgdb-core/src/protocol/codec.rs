//! Encoding helpers for the two representations the bridge deals with.
//!
//! - **JSON**: tagged messages exchanged with the host and the relay.
//! - **Raw**: bytes written to a serial line.  Text is lowered to bytes one
//!   character at a time, keeping only the low 8 bits of each code point, so
//!   that Latin-1 text produced by [`decode_raw`] survives the round trip.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Errors that can occur while encoding or decoding a JSON message.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The value could not be serialised.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// The text is not a valid message of the expected shape.
    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Serialises a message to its JSON text form.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialisation fails.
pub fn encode_json<T: Serialize>(msg: &T) -> Result<String, CodecError> {
    serde_json::to_string(msg).map_err(CodecError::Encode)
}

/// Parses a JSON text frame into a message.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] if the text is not valid JSON or does not
/// match the message shape.
pub fn decode_json<T: DeserializeOwned>(text: &str) -> Result<T, CodecError> {
    serde_json::from_str(text).map_err(CodecError::Decode)
}

/// Lowers text to the raw bytes written on a serial line.
///
/// No framing is applied; characters above `U+00FF` are truncated to their
/// low byte.
///
/// ```rust
/// use vmgdb_core::protocol::encode_raw;
///
/// assert_eq!(encode_raw("$OK#9a"), b"$OK#9a".to_vec());
/// ```
pub fn encode_raw(text: &str) -> Vec<u8> {
    text.chars().map(|c| (u32::from(c) & 0xFF) as u8).collect()
}

/// Lifts raw serial bytes to text, one character per byte.
pub fn decode_raw(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
