//! Error types for the protocol layer.

/// Errors that can occur while encoding request bodies or decoding
/// response bodies.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: an HTML error page where JSON was expected, a
    /// missing required field, or an empty body.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message decoded but violates the API contract, e.g. a sign-in
    /// response whose token pair has an empty token.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
