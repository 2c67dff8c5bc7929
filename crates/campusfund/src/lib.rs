//! # campusfund
//!
//! Client library for the campusfund student-finance API.
//!
//! Every request goes through a session pipeline that attaches the
//! stored bearer token, refreshes an expired access token once (shared by
//! all requests that hit the expiry together), replays the failed
//! request, and signs the user out when the session can't be recovered.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use campusfund::prelude::*;
//!
//! # async fn run() -> Result<(), CampusfundError> {
//! let client = ApiClient::builder()
//!     .config(ClientConfig::from_env())
//!     .build(FileStorage::open("session.json")?)?;
//!
//! let mut notices = client.subscribe();
//! let auth = AuthService::new(client.clone());
//!
//! let user = match auth.bootstrap().await? {
//!     Some(user) => user,
//!     None => auth.login(&Credentials::new("ada@uni.edu", "secret")).await?,
//! };
//! println!("signed in as {}", user.display_name());
//!
//! // Elsewhere: send the user back to sign-in when the session ends.
//! if let Ok(notice) = notices.try_recv() {
//!     println!("{notice}");
//! }
//! # Ok(())
//! # }
//! ```

mod auth;
mod client;
mod config;
mod error;
mod notice;

pub use auth::AuthService;
pub use client::{ApiClient, ApiClientBuilder};
pub use config::{ClientConfig, BASE_URL_ENV, DEFAULT_BASE_URL};
pub use error::CampusfundError;
pub use notice::{SessionNotice, SESSION_EXPIRED_MESSAGE};

/// Everything needed for typical use.
pub mod prelude {
    pub use crate::{
        ApiClient, ApiClientBuilder, AuthService, CampusfundError, ClientConfig,
        SessionNotice,
    };
    pub use campusfund_protocol::{
        ApiRequest, ApiResponse, Credentials, Method, Registration, Role,
        TokenPair, UserProfile,
    };
    pub use campusfund_session::{
        FileStorage, LogoutReason, MemoryStorage, SessionConfig, SessionError,
        SessionManager, TokenStorage,
    };
    pub use campusfund_transport::{ReqwestTransport, Transport, TransportError};
}
