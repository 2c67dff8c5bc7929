//! Unified error type for the campusfund client.

use campusfund_protocol::ProtocolError;
use campusfund_session::{SessionError, StorageError};
use campusfund_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `campusfund` facade you deal with this single error
/// type instead of importing errors from each sub-crate. The `#[from]`
/// variants let `?` convert sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum CampusfundError {
    /// A transport-level error (no response at all).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode or decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (no refresh token, refresh failed).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Token storage couldn't be opened or written.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The token endpoint refused the credentials.
    #[error("sign-in rejected with status {status}")]
    LoginRejected { status: u16 },

    /// The registration endpoint refused the new account. `body` holds the
    /// field errors as returned by the API.
    #[error("registration rejected with status {status}: {body}")]
    RegistrationRejected { status: u16, body: String },

    /// The API answered with a non-2xx status.
    #[error("request failed with status {status}")]
    Status { status: u16, body: String },
}

impl CampusfundError {
    /// `true` if the server no longer accepts this client's credentials:
    /// a 401 that survived the refresh pipeline, or a session that was
    /// torn down while handling one.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status == 401,
            Self::Session(e) => e.is_session_ended(),
            _ => false,
        }
    }
}
