/// Errors that can occur in the transport layer.
///
/// Every variant means "no HTTP response was received". These bypass
/// the session layer's refresh handling entirely.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request path could not be joined onto the base URL.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// The server could not be reached (DNS, refused, TLS, reset).
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The request did not complete in time.
    #[error("request timed out")]
    Timeout,

    /// The response body could not be read.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Any other client-side failure.
    #[error("transport error: {0}")]
    Other(String),
}
