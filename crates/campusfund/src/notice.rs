//! Session notices published to the application.

use std::fmt;

use campusfund_session::LogoutReason;

/// Message shown to the user when their session ends on its own.
pub const SESSION_EXPIRED_MESSAGE: &str = "Your session expired. Please sign in again.";

/// Broadcast whenever the session ends. A UI subscribes through
/// [`ApiClient::subscribe`](crate::ApiClient::subscribe) and sends the
/// user back to sign-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionNotice {
    /// The session could not be recovered. Show
    /// [`message`](Self::message) next to the sign-in form.
    Expired,

    /// The user signed out.
    SignedOut,
}

impl SessionNotice {
    /// User-facing text for this notice, if any.
    pub fn message(self) -> Option<&'static str> {
        match self {
            Self::Expired => Some(SESSION_EXPIRED_MESSAGE),
            Self::SignedOut => None,
        }
    }
}

impl From<LogoutReason> for SessionNotice {
    fn from(reason: LogoutReason) -> Self {
        if reason.is_expiry() {
            Self::Expired
        } else {
            Self::SignedOut
        }
    }
}

impl fmt::Display for SessionNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expired => f.write_str(SESSION_EXPIRED_MESSAGE),
            Self::SignedOut => f.write_str("Signed out."),
        }
    }
}
