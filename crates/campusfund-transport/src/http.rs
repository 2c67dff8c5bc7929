//! HTTP transport implementation using `reqwest`.

use std::time::Duration;

use campusfund_protocol::{ApiRequest, ApiResponse, Method};
use reqwest::{Client, Url};

use crate::{Transport, TransportError};

const USER_AGENT: &str = concat!("campusfund/", env!("CARGO_PKG_VERSION"));

/// A [`Transport`] that sends requests to a fixed API base URL.
///
/// Request paths are appended to the base URL, so a base of
/// `http://localhost:8000` and a path of `/api/users/me/` produce
/// `http://localhost:8000/api/users/me/`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
}

impl ReqwestTransport {
    /// Creates a transport for `base_url` with the given per-request
    /// timeout.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUrl`] if `base_url` doesn't parse,
    /// or [`TransportError::Other`] if the client can't be built.
    pub fn new(
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        Url::parse(base_url)
            .map_err(|e| TransportError::InvalidUrl(format!("{base_url}: {e}")))?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;

        Ok(Self::with_client(client, base_url))
    }

    /// Creates a transport around an already configured `reqwest::Client`.
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// The base URL every request path is appended to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> Result<Url, TransportError> {
        let raw = if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        };
        Url::parse(&raw).map_err(|e| TransportError::InvalidUrl(format!("{raw}: {e}")))
    }

    const fn to_reqwest_method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
            Method::Head => reqwest::Method::HEAD,
            Method::Options => reqwest::Method::OPTIONS,
        }
    }

    fn map_error(error: &reqwest::Error) -> TransportError {
        if error.is_timeout() {
            return TransportError::Timeout;
        }
        if error.is_connect() {
            return TransportError::ConnectionFailed(error.to_string());
        }
        if error.is_body() || error.is_decode() {
            return TransportError::ReceiveFailed(error.to_string());
        }
        TransportError::Other(error.to_string())
    }
}

impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: ApiRequest,
    ) -> Result<ApiResponse, TransportError> {
        let url = self.url_for(&request.path)?;
        let method = Self::to_reqwest_method(request.method);

        let mut builder = self.client.request(method, url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::debug!(
                method = %request.method,
                path = %request.path,
                error = %e,
                "request failed without a response"
            );
            Self::map_error(&e)
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| Self::map_error(&e))?
            .to_vec();

        tracing::debug!(
            method = %request.method,
            path = %request.path,
            status,
            "response received"
        );

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}
