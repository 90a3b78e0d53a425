//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding wire messages.
///
/// Decode failures are reported back to the offending connection only;
/// they never close it.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The frame is not a message we understand: malformed JSON, a
    /// missing `type`, an unknown `type`, or missing required fields.
    #[cfg(feature = "json")]
    #[error("invalid message: {0}")]
    Decode(serde_json::Error),
}
