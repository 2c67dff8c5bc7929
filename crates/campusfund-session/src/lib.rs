//! Client-side session management for campusfund.
//!
//! This crate owns the access/refresh token lifecycle so the rest of the
//! client never has to think about it:
//!
//! 1. **Storage**: tokens live in a durable key-value store
//!    ([`TokenStorage`] trait; [`FileStorage`], [`MemoryStorage`]).
//! 2. **Attachment**: every non-exempt request gets
//!    `Authorization: Bearer <access_token>`
//!    ([`SessionManager::attach_auth`]).
//! 3. **Recovery**: a 401 triggers one shared token refresh and a single
//!    replay of the failed request ([`SessionManager::handle_response`]).
//! 4. **Logout**: when the session can't be recovered, both tokens are
//!    removed and the registered logout handler is told why
//!    ([`LogoutReason`]).
//!
//! # How it fits in the stack
//!
//! ```text
//! Facade (above)     ← login, profile, typed JSON calls
//!     ↕
//! Session (this crate) ← token lifecycle, refresh, replay
//!     ↕
//! Transport (below)  ← sends ApiRequest, returns ApiResponse
//! ```

mod error;
mod manager;
mod refresh;
mod session;
mod storage;

pub use error::{RefreshError, SessionError, StorageError};
pub use manager::SessionManager;
pub use session::{LogoutReason, RefreshState, SessionConfig};
pub use storage::{
    FileStorage, MemoryStorage, TokenStorage, ACCESS_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
};
