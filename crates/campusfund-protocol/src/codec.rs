//! Codec trait and implementations for request and response bodies.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! Envelopes carry bodies as `Vec<u8>`; whoever builds or reads a body
//! goes through a [`Codec`] so the envelope types never depend on one
//! serialization format.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// - `Send + Sync` → shareable across Tokio tasks.
/// - `'static` → owns everything it needs, so it can live inside
///   long-lived clients and storage backends.
pub trait Codec: Send + Sync + 'static {
    /// The `Content-Type` header value for bodies produced by this codec.
    fn content_type(&self) -> &'static str;

    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

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

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`). The REST API speaks
/// JSON exclusively, so this is the codec every client uses.
///
/// ## Example
///
/// ```rust
/// use campusfund_protocol::{Codec, JsonCodec, RefreshRequest};
///
/// let codec = JsonCodec;
/// let bytes = codec
///     .encode(&RefreshRequest { refresh: "R1".into() })
///     .unwrap();
/// assert_eq!(bytes, br#"{"refresh":"R1"}"#);
///
/// let decoded: RefreshRequest = codec.decode(&bytes).unwrap();
/// assert_eq!(decoded.refresh, "R1");
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
