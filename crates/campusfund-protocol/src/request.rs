//! The outbound request envelope.
//!
//! An [`ApiRequest`] is a plain description of one API call: method,
//! path relative to the API base URL, headers, and an optional body. It
//! also carries two flags that steer the session layer:
//!
//! - `skip_auth_refresh`: the request is *refresh-exempt*: no bearer
//!   token is attached and a 401 never triggers a token refresh. Login,
//!   registration, and the refresh call itself are sent this way.
//! - `retried`: the request has already been replayed once after a
//!   refresh. A second 401 is handed back to the caller as-is.

use std::fmt;

#[cfg(feature = "json")]
use serde::Serialize;

#[cfg(feature = "json")]
use crate::{Codec, JsonCodec, ProtocolError};

/// Name of the header carrying the bearer credential.
pub const AUTHORIZATION: &str = "Authorization";

/// Name of the header describing the body format.
pub const CONTENT_TYPE: &str = "Content-Type";

const BEARER_PREFIX: &str = "Bearer ";

// ---------------------------------------------------------------------------
// Method
// ---------------------------------------------------------------------------

/// HTTP method of an [`ApiRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    /// The canonical upper-case name, e.g. `"POST"`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ApiRequest
// ---------------------------------------------------------------------------

/// One outbound call to the REST API.
///
/// Header names are matched case-insensitively; setting a header that
/// already exists replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,

    /// Path relative to the API base URL, e.g. `/api/users/me/`.
    pub path: String,

    /// Request headers as `(name, value)` pairs.
    pub headers: Vec<(String, String)>,

    /// Raw body bytes, if any.
    pub body: Option<Vec<u8>>,

    /// Refresh-exempt: skip bearer attachment and 401 recovery.
    pub skip_auth_refresh: bool,

    /// Set once the request has been replayed after a token refresh.
    pub retried: bool,
}

impl ApiRequest {
    /// Creates a request with no headers and no body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            ..Self::default()
        }
    }

    /// Shorthand for a `GET` request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// Shorthand for a `POST` request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    /// Shorthand for a `PUT` request.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    /// Shorthand for a `PATCH` request.
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    /// Shorthand for a `DELETE` request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Marks the request refresh-exempt.
    pub fn exempt(mut self) -> Self {
        self.skip_auth_refresh = true;
        self
    }

    /// Builder form of [`set_header`](Self::set_header).
    pub fn header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.set_header(name, value);
        self
    }

    /// Sets a raw body together with its content type.
    pub fn with_body(
        mut self,
        body: Vec<u8>,
        content_type: impl Into<String>,
    ) -> Self {
        self.set_header(CONTENT_TYPE, content_type);
        self.body = Some(body);
        self
    }

    /// Encodes `value` as JSON and uses it as the body.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if `value` can't be serialized.
    #[cfg(feature = "json")]
    pub fn with_json<T: Serialize>(
        self,
        value: &T,
    ) -> Result<Self, ProtocolError> {
        let body = JsonCodec.encode(value)?;
        Ok(self.with_body(body, JsonCodec.content_type()))
    }

    /// Sets a header, replacing any existing header with the same name.
    pub fn set_header(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) {
        let name = name.into();
        self.remove_header(&name);
        self.headers.push((name, value.into()));
    }

    /// Removes every header named `name`.
    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Returns the value of the first header named `name`.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Sets `Authorization: Bearer <token>`.
    pub fn set_bearer(&mut self, token: &str) {
        self.set_header(AUTHORIZATION, format!("{BEARER_PREFIX}{token}"));
    }

    /// The token of the `Authorization: Bearer` header, if present.
    pub fn bearer_token(&self) -> Option<&str> {
        self.header_value(AUTHORIZATION)
            .and_then(|v| v.strip_prefix(BEARER_PREFIX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_header_replaces_case_insensitively() {
        let mut req = ApiRequest::get("/api/loans/")
            .header("authorization", "Bearer old");
        req.set_header("Authorization", "Bearer new");

        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.header_value("AUTHORIZATION"), Some("Bearer new"));
    }

    #[test]
    fn test_bearer_token_reads_back_set_bearer() {
        let mut req = ApiRequest::get("/api/users/me/");
        assert_eq!(req.bearer_token(), None);

        req.set_bearer("A1");
        assert_eq!(req.header_value(AUTHORIZATION), Some("Bearer A1"));
        assert_eq!(req.bearer_token(), Some("A1"));
    }

    #[test]
    fn test_bearer_token_ignores_other_schemes() {
        let req = ApiRequest::get("/").header(AUTHORIZATION, "Basic dXNlcg==");
        assert_eq!(req.bearer_token(), None);
    }

    #[test]
    fn test_exempt_sets_flag_only() {
        let req = ApiRequest::post("/api/auth/token/").exempt();
        assert!(req.skip_auth_refresh);
        assert!(!req.retried);
        assert_eq!(req.method, Method::Post);
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_with_json_sets_body_and_content_type() {
        let req = ApiRequest::post("/api/auth/token/refresh/")
            .with_json(&crate::RefreshRequest { refresh: "R1".into() })
            .expect("should encode");

        assert_eq!(req.header_value(CONTENT_TYPE), Some("application/json"));
        assert_eq!(req.body.as_deref(), Some(&br#"{"refresh":"R1"}"#[..]));
    }

    #[test]
    fn test_method_display() {
        assert_eq!(Method::Patch.to_string(), "PATCH");
        assert_eq!(Method::default(), Method::Get);
    }
}
