//! Codec trait and the JSON implementation.
//!
//! Everything above the transport speaks in typed messages; a [`Codec`]
//! is the single place where those become bytes and back.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes Rust values to frames and decodes frames back.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into a frame.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if the value cannot be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes a frame into a value.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the frame is malformed or does
    /// not match `T`.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] producing the `{"type": ..., "payload": ...}` JSON frames
/// browser clients expect.
///
/// ```rust
/// use scribble_protocol::{Codec, JsonCodec, ServerMessage, TimerPayload};
///
/// let codec = JsonCodec;
/// let bytes = codec
///     .encode(&ServerMessage::GuessWordTimer(TimerPayload { time_remaining: 12 }))
///     .unwrap();
/// assert_eq!(bytes, br#"{"type":"guessWordTimer","payload":{"timeRemaining":12}}"#);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
