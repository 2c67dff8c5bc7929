//! The response envelope returned by a transport.

#[cfg(feature = "json")]
use serde::de::DeserializeOwned;

#[cfg(feature = "json")]
use crate::{Codec, JsonCodec, ProtocolError};

/// Status code the session layer treats as "access token rejected".
pub const UNAUTHORIZED: u16 = 401;

/// A completed HTTP exchange: any status the server returned, including
/// 4xx and 5xx. Transport failures (no response at all) never produce an
/// `ApiResponse`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,

    /// Response headers as `(name, value)` pairs.
    pub headers: Vec<(String, String)>,

    /// Raw body bytes (possibly empty).
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Creates a response with no headers.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Adds a header.
    pub fn with_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// `true` for any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `true` for 401.
    pub fn is_unauthorized(&self) -> bool {
        self.status == UNAUTHORIZED
    }

    /// Returns the value of the first header named `name`.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The body as UTF-8 text, with invalid sequences replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decodes the body as JSON.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the body doesn't match `T`.
    #[cfg(feature = "json")]
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        JsonCodec.decode(&self.body)
    }
}
