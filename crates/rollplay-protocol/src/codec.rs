//! Codec trait and implementations for text frames.
//!
//! The session engine produces [`ServerMessage`](crate::ServerMessage)
//! values and consumes [`ClientMessage`](crate::ClientMessage) values; a
//! codec turns them into the text carried by one transport frame.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that encodes values to text frames and decodes them back.
///
/// `Send + Sync + 'static` because a single codec instance is shared by
/// every connection task for the lifetime of the server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into the text of one frame.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;

    /// Deserializes the text of one frame.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the text is malformed or doesn't
    /// match the expected message shape.
    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use rollplay_protocol::{ClientMessage, CharacterId, Codec, JsonCodec};
///
/// let codec = JsonCodec;
/// let msg: ClientMessage = codec
///     .decode(r#"{"type":"character:remove","id":4}"#)
///     .unwrap();
/// assert_eq!(msg, ClientMessage::RemoveCharacter { id: CharacterId(4) });
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{CharacterId, ClientMessage, ServerMessage};

    #[test]
    fn test_decode_garbage_returns_decode_error() {
        let result: Result<ClientMessage, _> = JsonCodec.decode("not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_encode_produces_single_json_object() {
        let text = JsonCodec
            .encode(&ServerMessage::CharacterLeave { id: CharacterId(3) })
            .unwrap();
        assert_eq!(text, r#"{"type":"character:leave","id":3}"#);
    }

    #[test]
    fn test_decode_error_message_is_readable() {
        let err = JsonCodec
            .decode::<ClientMessage>(r#"{"type":"character:move","id":1}"#)
            .unwrap_err();
        assert!(err.to_string().starts_with("invalid message"));
    }
}
