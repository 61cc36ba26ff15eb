//! Codec trait and the JSON implementation used for request bodies.
//!
//! The binary frame layout lives in [`crate::packet`]; only the body of a
//! create/join command is a structured document. Keeping that behind the
//! [`Codec`] trait means the hub never names a concrete format, and tests
//! can decode bodies exactly the way the hub does.

use serde::de::DeserializeOwned;

use crate::ProtocolError;

/// A codec that decodes request bodies into Rust types.
///
/// `Send + Sync + 'static` because the hub actor owns one for the
/// lifetime of the process and may run on any runtime worker.
pub trait Codec: Send + Sync + 'static {
    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ```rust
/// use nexus_protocol::{Codec, JsonCodec, RoomRequest};
///
/// let codec = JsonCodec;
/// let body = br#"{"room_pwd":"pw","app_name":"demo","player_name":"Alice"}"#;
/// let req: RoomRequest = codec.decode(body).unwrap();
/// assert_eq!(req.player_name, "Alice");
/// assert_eq!(req.secret, "pw");
/// assert!(req.room_code.is_empty());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RoomRequest;

    #[test]
    fn test_json_codec_decode_garbage_returns_decode_error() {
        let result: Result<RoomRequest, _> = JsonCodec.decode(b"not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_json_codec_decode_wrong_shape_returns_decode_error() {
        let result: Result<RoomRequest, _> = JsonCodec.decode(b"[1, 2]");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
