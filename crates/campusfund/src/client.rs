//! `ApiClient` builder and the typed request helpers.
//!
//! This is the entry point for talking to the campusfund API. It ties
//! together all the layers: transport → protocol → session.

use std::sync::Arc;

use campusfund_protocol::{ApiRequest, ApiResponse};
use campusfund_session::{MemoryStorage, SessionManager, TokenStorage};
use campusfund_transport::{ReqwestTransport, Transport};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::{CampusfundError, ClientConfig, SessionNotice};

/// How many notices a slow subscriber may fall behind before it starts
/// missing them.
const NOTICE_CAPACITY: usize = 16;

/// Builder for configuring an [`ApiClient`].
///
/// # Example
///
/// ```rust,no_run
/// use campusfund::prelude::*;
///
/// # fn run() -> Result<(), CampusfundError> {
/// let client = ApiClient::builder()
///     .config(ClientConfig::from_env())
///     .build(FileStorage::open("session.json")?)?;
/// # Ok(())
/// # }
/// ```
pub struct ApiClientBuilder {
    config: ClientConfig,
}

impl ApiClientBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the API base URL.
    pub fn base_url(mut self, url: &str) -> Self {
        self.config.base_url = url.to_string();
        self
    }

    /// Builds a client that talks HTTP through `reqwest`.
    ///
    /// # Errors
    /// Returns [`CampusfundError::Transport`] if the base URL is invalid or
    /// the HTTP client can't be created.
    pub fn build<S: TokenStorage>(
        self,
        storage: S,
    ) -> Result<ApiClient<ReqwestTransport, S>, CampusfundError> {
        let transport =
            ReqwestTransport::new(&self.config.base_url, self.config.request_timeout)?;
        Ok(self.build_with_transport(transport, storage))
    }

    /// Builds a client over any transport.
    pub fn build_with_transport<T: Transport, S: TokenStorage>(
        self,
        transport: T,
        storage: S,
    ) -> ApiClient<T, S> {
        let session =
            SessionManager::new(transport, storage, self.config.session_config());
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        let tx = notices.clone();
        session.register_logout_handler(move |reason| {
            let notice = SessionNotice::from(reason);
            // Nobody listening is fine.
            let _ = tx.send(notice);
        });

        tracing::debug!(base_url = %self.config.base_url, "api client ready");
        ApiClient {
            session,
            notices,
            config: Arc::new(self.config),
        }
    }
}

impl Default for ApiClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A configured client for the campusfund API.
///
/// Every call goes through the [`SessionManager`], so bearer tokens are
/// attached and expired access tokens are refreshed transparently.
/// Cloning is cheap; clones share the session.
pub struct ApiClient<T, S> {
    session: SessionManager<T, S>,
    notices: broadcast::Sender<SessionNotice>,
    config: Arc<ClientConfig>,
}

impl<T, S> Clone for ApiClient<T, S> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            notices: self.notices.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl ApiClient<ReqwestTransport, MemoryStorage> {
    /// Creates a new builder.
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::new()
    }
}

impl<T: Transport, S: TokenStorage> ApiClient<T, S> {
    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The session behind this client.
    pub fn session(&self) -> &SessionManager<T, S> {
        &self.session
    }

    /// Subscribes to session notices. Only notices sent after this call
    /// are received.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    /// Sends `request` through the session pipeline and requires a 2xx.
    ///
    /// # Errors
    /// - [`CampusfundError::Status`] for a non-2xx final response
    /// - [`CampusfundError::Session`] if the session ended or no response
    ///   arrived
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, CampusfundError> {
        let response = self.session.send(request).await?;
        ensure_success(response)
    }

    /// `GET path`, decoding the JSON response body.
    ///
    /// # Errors
    /// As [`send`](Self::send), plus [`CampusfundError::Protocol`] if the
    /// body doesn't decode as `R`.
    pub async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R, CampusfundError> {
        let response = self.send(ApiRequest::get(path)).await?;
        Ok(response.json()?)
    }

    /// `POST path` with a JSON body, decoding the JSON response body.
    ///
    /// # Errors
    /// As [`get_json`](Self::get_json), plus
    /// [`CampusfundError::Protocol`] if `body` can't be encoded.
    pub async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, CampusfundError>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let request = ApiRequest::post(path).with_json(body)?;
        let response = self.send(request).await?;
        Ok(response.json()?)
    }
}

/// Turns a non-2xx response into [`CampusfundError::Status`].
pub(crate) fn ensure_success(response: ApiResponse) -> Result<ApiResponse, CampusfundError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(CampusfundError::Status {
            status: response.status,
            body: response.text(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use campusfund_protocol::TokenPair;
    use campusfund_transport::TransportError;
    use serde::Deserialize;

    /// Answers every request with the same status and body, and records
    /// what it was sent.
    struct Fixed {
        status: u16,
        body: &'static str,
        seen: Mutex<Vec<ApiRequest>>,
    }

    impl Fixed {
        fn new(status: u16, body: &'static str) -> Self {
            Self {
                status,
                body,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Transport for Fixed {
        async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
            self.seen.lock().unwrap().push(request);
            Ok(ApiResponse::new(self.status, self.body))
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Loan {
        id: u64,
        status: String,
    }

    fn client(status: u16, body: &'static str) -> ApiClient<Arc<Fixed>, MemoryStorage> {
        let storage = MemoryStorage::with_session(&TokenPair {
            access: "A1".into(),
            refresh: "R1".into(),
        });
        ApiClientBuilder::new().build_with_transport(Arc::new(Fixed::new(status, body)), storage)
    }

    #[tokio::test]
    async fn test_get_json_decodes_body() {
        let client = client(200, r#"{"id":7,"status":"pending"}"#);
        let loan: Loan = client.get_json("/api/loans/7/").await.unwrap();
        assert_eq!(
            loan,
            Loan {
                id: 7,
                status: "pending".into()
            }
        );
        let seen = client.session().transport().seen.lock().unwrap().clone();
        assert_eq!(seen[0].bearer_token(), Some("A1"));
    }

    #[tokio::test]
    async fn test_post_json_sends_json_body() {
        let client = client(201, r#"{"id":1,"status":"pending"}"#);
        let body = serde_json::json!({"amount": "500.00", "purpose": "tuition"});

        let loan: Loan = client.post_json("/api/loans/", &body).await.unwrap();

        assert_eq!(loan.id, 1);
        let seen = client.session().transport().seen.lock().unwrap().clone();
        assert_eq!(seen[0].header_value("content-type"), Some("application/json"));
        let sent: serde_json::Value =
            serde_json::from_slice(seen[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(sent, body);
    }

    #[tokio::test]
    async fn test_send_non_success_is_status_error() {
        let client = client(403, r#"{"detail":"You do not have permission."}"#);
        let err = client.send(ApiRequest::delete("/api/loans/7/")).await.unwrap_err();
        match err {
            CampusfundError::Status { status, body } => {
                assert_eq!(status, 403);
                assert!(body.contains("permission"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_json_undecodable_body_is_protocol_error() {
        let client = client(200, "<html>oops</html>");
        let err = client.get_json::<Loan>("/api/loans/7/").await.unwrap_err();
        assert!(matches!(err, CampusfundError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_clear_session_publishes_signed_out() {
        let client = client(200, "{}");
        let mut notices = client.subscribe();

        client.session().clear_session().unwrap();

        assert_eq!(notices.recv().await.unwrap(), SessionNotice::SignedOut);
    }

    #[test]
    fn test_builder_rejects_invalid_base_url() {
        let result = ApiClient::builder()
            .base_url("not a url")
            .build(MemoryStorage::new());
        assert!(matches!(result, Err(CampusfundError::Transport(_))));
    }
}
