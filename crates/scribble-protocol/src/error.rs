//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding wire messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The bytes are not valid JSON, or the payload does not match the
    /// shape its `type` requires.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message is well-formed but breaks a protocol rule.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
