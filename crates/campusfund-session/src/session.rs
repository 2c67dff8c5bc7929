//! Session configuration and the small enums describing session state.

use std::fmt;
use std::time::Duration;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for the session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Path of the token refresh endpoint, relative to the API base URL.
    ///
    /// Default: `/api/auth/token/refresh/`.
    pub refresh_path: String,

    /// Upper bound on one refresh call, including every request waiting
    /// on it. A refresh that hasn't settled by then counts as failed and
    /// ends the session.
    ///
    /// Default: 10 seconds.
    pub refresh_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_path: "/api/auth/token/refresh/".to_string(),
            refresh_timeout: Duration::from_secs(10),
        }
    }
}

// ---------------------------------------------------------------------------
// RefreshState
// ---------------------------------------------------------------------------

/// Whether a token refresh is currently running.
///
/// ```text
///   Idle ──(first 401 with a refresh token)──→ Refreshing
///    ↑                                             │
///    └────────(refresh settles, either way)────────┘
/// ```
///
/// While `Refreshing`, further 401s join the running refresh instead of
/// starting their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

// ---------------------------------------------------------------------------
// LogoutReason
// ---------------------------------------------------------------------------

/// Why the session ended. Passed to the registered logout handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogoutReason {
    /// A request was rejected and no refresh token was stored.
    NoRefreshToken,

    /// The refresh call failed (rejected, malformed, unreachable, or
    /// timed out).
    RefreshFailed,

    /// The application ended the session on purpose ("sign out").
    SignedOut,
}

impl LogoutReason {
    /// `true` when the session ended on its own rather than by request.
    pub fn is_expiry(self) -> bool {
        !matches!(self, Self::SignedOut)
    }
}

impl fmt::Display for LogoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoRefreshToken => "no refresh token",
            Self::RefreshFailed => "refresh failed",
            Self::SignedOut => "signed out",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.refresh_path, "/api/auth/token/refresh/");
        assert_eq!(cfg.refresh_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_logout_reason_is_expiry() {
        assert!(LogoutReason::NoRefreshToken.is_expiry());
        assert!(LogoutReason::RefreshFailed.is_expiry());
        assert!(!LogoutReason::SignedOut.is_expiry());
    }
}
