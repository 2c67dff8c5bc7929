//! Client configuration: where the API lives and which paths it serves.

use std::time::Duration;

use campusfund_session::SessionConfig;

/// Environment variable that overrides [`ClientConfig::base_url`].
pub const BASE_URL_ENV: &str = "CAMPUSFUND_API_BASE_URL";

/// Base URL used when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Configuration for an [`ApiClient`](crate::ApiClient).
///
/// Paths are relative to `base_url` and keep the API's trailing slashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Scheme, host, and port of the API.
    ///
    /// Default: `http://localhost:8000`.
    pub base_url: String,

    /// Timeout for a single HTTP exchange.
    ///
    /// Default: 30 seconds.
    pub request_timeout: Duration,

    /// Token issue endpoint (sign-in).
    pub token_path: String,

    /// Token refresh endpoint.
    pub refresh_path: String,

    /// Self-registration endpoint.
    pub register_path: String,

    /// Current user's profile.
    pub profile_path: String,

    /// Upper bound on one token refresh. See
    /// [`SessionConfig::refresh_timeout`].
    ///
    /// Default: 10 seconds.
    pub refresh_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            token_path: "/api/auth/token/".to_string(),
            refresh_path: session.refresh_path,
            register_path: "/api/auth/register/".to_string(),
            profile_path: "/api/users/me/".to_string(),
            refresh_timeout: session.refresh_timeout,
        }
    }
}

impl ClientConfig {
    /// Defaults, with the base URL taken from `CAMPUSFUND_API_BASE_URL`
    /// when it is set and non-empty.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through
    /// `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(url) = lookup(BASE_URL_ENV) {
            let url = url.trim();
            if !url.is_empty() {
                config.base_url = url.to_string();
            }
        }
        config
    }

    /// Sets the base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the per-request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the refresh timeout.
    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    /// The session-layer slice of this configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            refresh_path: self.refresh_path.clone(),
            refresh_timeout: self.refresh_timeout,
        }
    }
}
