//! Wire protocol for campusfund.
//!
//! This crate defines the shapes that travel between the client and the
//! student-finance REST API:
//!
//! - **Envelopes** ([`ApiRequest`], [`ApiResponse`]): one outbound call
//!   and its result, independent of any HTTP library.
//! - **Auth types** ([`Credentials`], [`TokenPair`], [`RefreshRequest`],
//!   [`RefreshResponse`], [`Registration`], [`UserProfile`]): the JSON
//!   bodies of the token and user endpoints.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how bodies are converted
//!   to/from bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! ```text
//! Session (token lifecycle) → Protocol (ApiRequest) → Transport (HTTP)
//! ```
//!
//! The protocol layer knows nothing about tokens being valid or expired.
//! It only carries the flags ([`ApiRequest::skip_auth_refresh`],
//! [`ApiRequest::retried`]) the session layer reads.

mod auth;
mod codec;
mod error;
mod request;
mod response;

pub use auth::{
    Credentials, RefreshRequest, RefreshResponse, Registration, Role,
    TokenPair, UserProfile,
};
pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use request::{ApiRequest, Method, AUTHORIZATION, CONTENT_TYPE};
pub use response::{ApiResponse, UNAUTHORIZED};
