//! Error types for the session layer.

use std::sync::Arc;
use std::time::Duration;

use campusfund_protocol::ProtocolError;
use campusfund_transport::TransportError;

/// Errors raised by a [`TokenStorage`](crate::TokenStorage) backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed.
    #[error("token storage io failed: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file exists but isn't a JSON object of strings, or
    /// the entries couldn't be encoded.
    #[error("token storage is corrupt: {0}")]
    Codec(#[from] ProtocolError),
}

/// Why a token refresh failed.
///
/// `Clone` because one outcome is handed to every request waiting on the
/// same refresh.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RefreshError {
    /// The refresh endpoint answered with a non-2xx status (typically
    /// 401 once the refresh token itself has expired).
    #[error("refresh rejected with status {status}")]
    Rejected {
        /// HTTP status of the refresh response.
        status: u16,
        /// Raw response body, for diagnostics.
        body: String,
    },

    /// The refresh endpoint answered 2xx without a usable `access` field.
    #[error("refresh response carried no access token")]
    MissingAccessToken,

    /// The refresh request couldn't be encoded or the response couldn't
    /// be decoded.
    #[error("refresh response malformed: {0}")]
    Malformed(String),

    /// No response from the refresh endpoint at all.
    #[error("refresh request failed: {0}")]
    Transport(#[source] Arc<TransportError>),

    /// The new tokens couldn't be saved, so the session can't go on with
    /// them.
    #[error("refreshed tokens could not be stored: {0}")]
    Storage(#[source] Arc<StorageError>),

    /// The refresh didn't settle within
    /// [`SessionConfig::refresh_timeout`](crate::SessionConfig::refresh_timeout).
    #[error("refresh timed out after {0:?}")]
    TimedOut(Duration),
}

/// Errors returned by [`SessionManager`](crate::SessionManager).
///
/// Only the session-level outcomes are errors here. A plain 400/403/404/5xx
/// from the API is still `Ok(ApiResponse)`; the caller decides what it means.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The request produced no HTTP response. Never triggers a refresh.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server rejected the request and there was no refresh token to
    /// recover with. The session has been torn down.
    #[error("unauthenticated: server answered {status} and no refresh token is stored")]
    Unauthenticated {
        /// Status of the rejected response (always 401).
        status: u16,
    },

    /// The token refresh failed. The session has been torn down.
    #[error("session expired: {0}")]
    SessionExpired(#[source] RefreshError),

    /// Token storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A body couldn't be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl SessionError {
    /// `true` when the user has to sign in again.
    pub fn is_session_ended(&self) -> bool {
        matches!(self, Self::Unauthenticated { .. } | Self::SessionExpired(_))
    }
}
