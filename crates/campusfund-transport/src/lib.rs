//! Transport abstraction layer for campusfund.
//!
//! Provides the [`Transport`] trait: send one [`ApiRequest`], get back
//! the server's [`ApiResponse`] whatever its status, or a
//! [`TransportError`] if no response arrived at all.
//!
//! # Feature Flags
//!
//! - `reqwest` (default): HTTP transport via `reqwest`

mod error;
#[cfg(feature = "reqwest")]
mod http;

pub use error::TransportError;
#[cfg(feature = "reqwest")]
pub use http::ReqwestTransport;

use std::future::Future;

use campusfund_protocol::{ApiRequest, ApiResponse};

/// Sends requests to the REST API.
///
/// A 4xx/5xx status is NOT an error at this layer; it comes back as
/// `Ok(ApiResponse)`. Only a missing response (DNS failure, refused
/// connection, timeout, broken body stream) is a [`TransportError`].
///
/// The returned future must be `Send` so the session layer can drive it
/// from a shared refresh task.
pub trait Transport: Send + Sync + 'static {
    /// Sends one request and waits for the full response.
    fn send(
        &self,
        request: ApiRequest,
    ) -> impl Future<Output = Result<ApiResponse, TransportError>> + Send;
}

/// A shared transport is still a transport.
impl<T: Transport> Transport for std::sync::Arc<T> {
    fn send(
        &self,
        request: ApiRequest,
    ) -> impl Future<Output = Result<ApiResponse, TransportError>> + Send {
        T::send(self, request)
    }
}
