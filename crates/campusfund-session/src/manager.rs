//! The session manager: every outbound request passes through here.
//!
//! It is responsible for:
//! - Attaching the stored access token to outgoing requests
//! - Recognising a rejected access token (401)
//! - Running at most one token refresh at a time and sharing its result
//! - Replaying the rejected request once with the new token
//! - Tearing the session down when it can't be recovered
//!
//! # Concurrency note
//!
//! `SessionManager` is a cheap `Clone` handle around shared state, so any
//! number of tasks can send through it at once. The only shared mutable
//! state is the token storage and the in-flight refresh slot. The slot is
//! a plain `std::sync::Mutex` that is never held across an `.await`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use campusfund_protocol::{ApiRequest, ApiResponse, TokenPair};
use campusfund_transport::{Transport, TransportError};
use futures_util::future::{BoxFuture, FutureExt, Shared, WeakShared};

use crate::refresh::{request_grant, Grant};
use crate::{
    LogoutReason, RefreshError, RefreshState, SessionConfig, SessionError,
    StorageError, TokenStorage, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY,
};

/// The new access token, or why there isn't one.
type RefreshOutcome = Result<String, RefreshError>;

/// A refresh that any number of requests can await together.
type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

type LogoutHandler = Arc<dyn Fn(LogoutReason) + Send + Sync>;

/// The refresh currently occupying the slot.
///
/// The slot only holds a weak handle: the refresh lives exactly as long as
/// some request is waiting on it. When the last waiter is dropped the
/// refresh future is dropped too, and its [`SlotGuard`] empties the slot.
struct InFlight {
    /// Distinguishes this refresh from any later one, so a late cleanup
    /// never clears a slot that already belongs to its successor.
    generation: u64,
    future: WeakShared<BoxFuture<'static, RefreshOutcome>>,
}

/// What to do about a 401, decided under the slot lock.
enum Recovery {
    /// Await this refresh, then replay.
    Await(SharedRefresh),
    /// A refresh already replaced the token the request was sent with.
    Replay(String),
    /// Nothing to refresh with.
    NoRefreshToken,
}

/// State shared by every clone of a [`SessionManager`].
struct Inner<T, S> {
    transport: T,
    storage: S,
    config: SessionConfig,
    in_flight: Mutex<Option<InFlight>>,
    next_generation: AtomicU64,
    logout_handler: RwLock<Option<LogoutHandler>>,
}

/// Mediates every API call so callers never handle token lifecycle.
///
/// ## Request pipeline
///
/// ```text
/// send(request)
///   │
///   ├─ attach_auth ──→ Authorization: Bearer <access_token>
///   ├─ transport.send
///   └─ handle_response
///        │ not 401 / exempt / already retried ──→ returned as-is
///        │ 401, no refresh token ──→ logout, Err(Unauthenticated)
///        │ 401 ──→ join or start THE refresh
///        │            ├─ ok  ──→ replay once with new token
///        │            └─ err ──→ (logout already done) Err(SessionExpired)
/// ```
///
/// ## Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use campusfund_protocol::ApiRequest;
/// use campusfund_session::{FileStorage, SessionConfig, SessionManager};
/// use campusfund_transport::ReqwestTransport;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = ReqwestTransport::new("http://localhost:8000", Duration::from_secs(30))?;
/// let storage = FileStorage::open("session.json")?;
/// let session = SessionManager::new(transport, storage, SessionConfig::default());
///
/// session.register_logout_handler(|reason| {
///     eprintln!("signed out: {reason}");
/// });
///
/// let response = session.send(ApiRequest::get("/api/loans/")).await?;
/// println!("{}", response.status);
/// # Ok(())
/// # }
/// ```
pub struct SessionManager<T, S> {
    inner: Arc<Inner<T, S>>,
}

impl<T, S> Clone for SessionManager<T, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport, S: TokenStorage> SessionManager<T, S> {
    /// Creates a manager over the given transport and token storage.
    pub fn new(transport: T, storage: S, config: SessionConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                storage,
                config,
                in_flight: Mutex::new(None),
                next_generation: AtomicU64::new(1),
                logout_handler: RwLock::new(None),
            }),
        }
    }

    /// The configuration this manager was built with.
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// The underlying token storage.
    pub fn storage(&self) -> &S {
        &self.inner.storage
    }

    /// Whether a refresh is running right now.
    pub fn refresh_state(&self) -> RefreshState {
        if lock(&self.inner.in_flight).is_some() {
            RefreshState::Refreshing
        } else {
            RefreshState::Idle
        }
    }

    // =====================================================================
    // Tokens
    // =====================================================================

    /// The stored access token. An empty value counts as absent.
    pub fn access_token(&self) -> Option<String> {
        self.inner.token(ACCESS_TOKEN_KEY)
    }

    /// The stored refresh token. An empty value counts as absent.
    pub fn refresh_token(&self) -> Option<String> {
        self.inner.token(REFRESH_TOKEN_KEY)
    }

    /// `true` if both tokens are stored.
    pub fn has_session(&self) -> bool {
        self.access_token().is_some() && self.refresh_token().is_some()
    }

    /// Persists a freshly issued token pair (sign-in).
    ///
    /// # Errors
    /// Returns [`SessionError::Storage`] if either write fails.
    pub fn store_tokens(&self, tokens: &TokenPair) -> Result<(), SessionError> {
        self.inner.storage.set(ACCESS_TOKEN_KEY, &tokens.access)?;
        self.inner.storage.set(REFRESH_TOKEN_KEY, &tokens.refresh)?;
        tracing::info!("session tokens stored");
        Ok(())
    }

    /// Removes both tokens without notifying the logout handler.
    ///
    /// # Errors
    /// Returns [`SessionError::Storage`] if a removal fails. Both removals
    /// are attempted either way.
    pub fn clear_tokens(&self) -> Result<(), SessionError> {
        self.inner.clear_tokens().map_err(SessionError::from)
    }

    /// Ends the session on purpose ("sign out"): removes both tokens and
    /// notifies the logout handler with [`LogoutReason::SignedOut`].
    ///
    /// # Errors
    /// Returns [`SessionError::Storage`] if a removal fails. The handler is
    /// notified regardless.
    pub fn clear_session(&self) -> Result<(), SessionError> {
        let result = self.inner.clear_tokens();
        self.inner.notify_logout(LogoutReason::SignedOut);
        result.map_err(SessionError::from)
    }

    /// Installs the callback run whenever the session ends.
    ///
    /// There is only ever one handler; registering again replaces the
    /// previous one. The handler runs synchronously on whichever task
    /// ended the session, so it should hand off anything slow.
    pub fn register_logout_handler<F>(&self, handler: F)
    where
        F: Fn(LogoutReason) + Send + Sync + 'static,
    {
        let mut slot = self
            .inner
            .logout_handler
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Arc::new(handler));
    }

    // =====================================================================
    // Request pipeline
    // =====================================================================

    /// Decorates an outbound request with the stored access token.
    ///
    /// Exempt requests and requests made while no access token is stored
    /// are returned unchanged. Never fails, never waits.
    pub fn attach_auth(&self, mut request: ApiRequest) -> ApiRequest {
        if request.skip_auth_refresh {
            return request;
        }
        if let Some(token) = self.access_token() {
            request.set_bearer(&token);
        }
        request
    }

    /// Attaches credentials, sends the request, and recovers from an
    /// expired access token.
    ///
    /// # Errors
    /// See [`handle_response`](Self::handle_response).
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, SessionError> {
        let request = self.attach_auth(request);
        let result = self.inner.transport.send(request.clone()).await;
        self.handle_response(request, result).await
    }

    /// Inspects the outcome of `request` and recovers from a 401.
    ///
    /// `request` must be the request exactly as it was sent (after
    /// [`attach_auth`](Self::attach_auth)).
    ///
    /// # Returns
    /// - `Ok(response)`: anything other than a recoverable 401, or the
    ///   replayed request's response (whatever its status)
    ///
    /// # Errors
    /// - [`SessionError::Transport`]: no response; passed straight through
    /// - [`SessionError::Unauthenticated`]: 401 and no refresh token
    /// - [`SessionError::SessionExpired`]: the refresh failed
    pub async fn handle_response(
        &self,
        request: ApiRequest,
        result: Result<ApiResponse, TransportError>,
    ) -> Result<ApiResponse, SessionError> {
        let response = result?;

        if !response.is_unauthorized() || request.retried || request.skip_auth_refresh {
            return Ok(response);
        }

        self.recover(request, response).await
    }

    async fn recover(
        &self,
        request: ApiRequest,
        response: ApiResponse,
    ) -> Result<ApiResponse, SessionError> {
        match self.recovery_for(&request) {
            Recovery::Await(refresh) => match refresh.await {
                Ok(access) => self.replay(request, &access).await,
                Err(e) => Err(SessionError::SessionExpired(e)),
            },
            Recovery::Replay(current) => {
                tracing::debug!(
                    path = %request.path,
                    "access token changed since request was sent, replaying"
                );
                self.replay(request, &current).await
            }
            Recovery::NoRefreshToken => {
                tracing::info!(
                    path = %request.path,
                    "request rejected and no refresh token stored, ending session"
                );
                self.inner.end_session(LogoutReason::NoRefreshToken);
                Err(SessionError::Unauthenticated {
                    status: response.status,
                })
            }
        }
    }

    /// Sends `request` a second and final time with `access`.
    async fn replay(
        &self,
        mut request: ApiRequest,
        access: &str,
    ) -> Result<ApiResponse, SessionError> {
        request.retried = true;
        request.set_bearer(access);
        let response = self.inner.transport.send(request).await?;
        if response.is_unauthorized() {
            tracing::warn!("replayed request rejected again, not retrying");
        }
        Ok(response)
    }

    /// Joins the running refresh, or inspects storage and decides how to
    /// recover.
    ///
    /// Everything happens under the slot lock. A refresh that settles while
    /// this runs has either stored its tokens already (seen here as a
    /// replaced access token) or still occupies the slot (joined), so a
    /// stale refresh token is never sent. The lock is only held to decide;
    /// the refresh itself runs when the returned future is awaited.
    fn recovery_for(&self, request: &ApiRequest) -> Recovery {
        let mut slot = lock(&self.inner.in_flight);
        if let Some(flight) = slot.as_ref() {
            if let Some(refresh) = flight.future.upgrade() {
                tracing::debug!(generation = flight.generation, "joining in-flight refresh");
                return Recovery::Await(refresh);
            }
        }

        if let Some(current) = self.access_token() {
            if request.bearer_token() != Some(current.as_str()) {
                return Recovery::Replay(current);
            }
        }

        let Some(refresh_token) = self.refresh_token() else {
            return Recovery::NoRefreshToken;
        };

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let guard = SlotGuard {
            inner: Arc::clone(&self.inner),
            generation,
        };
        let inner = Arc::clone(&self.inner);
        let future = async move {
            let _guard = guard;
            inner.run_refresh(refresh_token).await
        }
        .boxed()
        .shared();

        tracing::debug!(generation, "starting token refresh");
        *slot = future.downgrade().map(|weak| InFlight {
            generation,
            future: weak,
        });
        Recovery::Await(future)
    }
}

impl<T: Transport, S: TokenStorage> Inner<T, S> {
    fn token(&self, key: &str) -> Option<String> {
        self.storage.get(key).filter(|t| !t.is_empty())
    }

    /// Calls the refresh endpoint and applies the outcome to storage.
    ///
    /// Runs once per refresh no matter how many requests wait on it, so
    /// the logout handler fires once per failed refresh.
    async fn run_refresh(&self, refresh_token: String) -> RefreshOutcome {
        let timeout = self.config.refresh_timeout;
        let call = request_grant(&self.transport, &self.config.refresh_path, &refresh_token);
        let outcome = match tokio::time::timeout(timeout, call).await {
            Ok(outcome) => outcome,
            Err(_) => Err(RefreshError::TimedOut(timeout)),
        };

        match outcome.and_then(|grant| self.persist(grant)) {
            Ok((access, rotated)) => {
                tracing::info!(rotated, "access token refreshed");
                Ok(access)
            }
            Err(e) => {
                tracing::warn!(error = %e, "token refresh failed, ending session");
                self.end_session(LogoutReason::RefreshFailed);
                Err(e)
            }
        }
    }

    /// Stores a fresh grant. A token that can't be saved is as good as
    /// lost, so a failed write fails the refresh. Returns the new access
    /// token and whether the refresh token was rotated.
    fn persist(&self, grant: Grant) -> Result<(String, bool), RefreshError> {
        let failed = |e: StorageError| RefreshError::Storage(Arc::new(e));
        if let Some(rotated) = &grant.refresh {
            self.storage.set(REFRESH_TOKEN_KEY, rotated).map_err(failed)?;
        }
        self.storage.set(ACCESS_TOKEN_KEY, &grant.access).map_err(failed)?;
        Ok((grant.access, grant.refresh.is_some()))
    }

    /// Removes both tokens, attempting both even if the first fails.
    fn clear_tokens(&self) -> Result<(), StorageError> {
        let access = self.storage.remove(ACCESS_TOKEN_KEY);
        let refresh = self.storage.remove(REFRESH_TOKEN_KEY);
        access.and(refresh)
    }

    /// Automatic logout: clear tokens, then tell the application.
    fn end_session(&self, reason: LogoutReason) {
        if let Err(e) = self.clear_tokens() {
            tracing::error!(error = %e, "failed to clear session tokens");
        }
        self.notify_logout(reason);
    }

    fn notify_logout(&self, reason: LogoutReason) {
        // Clone the handler out so it runs without the lock held and may
        // itself register a replacement.
        let handler = self
            .logout_handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        tracing::info!(%reason, "session ended");
        if let Some(handler) = handler {
            handler(reason);
        }
    }
}

/// Empties the in-flight slot when the refresh future that owns it
/// completes or is dropped.
struct SlotGuard<T, S> {
    inner: Arc<Inner<T, S>>,
    generation: u64,
}

impl<T, S> Drop for SlotGuard<T, S> {
    fn drop(&mut self) {
        let mut slot = lock(&self.inner.in_flight);
        if slot.as_ref().is_some_and(|f| f.generation == self.generation) {
            *slot = None;
            tracing::debug!(generation = self.generation, "refresh settled");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for the pieces of `SessionManager` that don't need a
    //! scripted backend. The full refresh flows live in
    //! `tests/session_manager.rs`.

    use super::*;
    use std::sync::atomic::AtomicUsize;

    use crate::MemoryStorage;

    /// Fails the test if anything is sent.
    struct NoNetwork;

    impl Transport for NoNetwork {
        async fn send(
            &self,
            request: ApiRequest,
        ) -> Result<ApiResponse, TransportError> {
            panic!("unexpected request to {}", request.path);
        }
    }

    fn pair(access: &str, refresh: &str) -> TokenPair {
        TokenPair {
            access: access.into(),
            refresh: refresh.into(),
        }
    }

    fn manager(storage: MemoryStorage) -> SessionManager<NoNetwork, MemoryStorage> {
        SessionManager::new(NoNetwork, storage, SessionConfig::default())
    }

    // =====================================================================
    // attach_auth()
    // =====================================================================

    #[test]
    fn test_attach_auth_sets_bearer_from_storage() {
        let mgr = manager(MemoryStorage::with_session(&pair("A1", "R1")));
        let req = mgr.attach_auth(ApiRequest::get("/api/users/me/"));
        assert_eq!(req.header_value("Authorization"), Some("Bearer A1"));
    }

    #[test]
    fn test_attach_auth_without_token_leaves_request_unchanged() {
        let mgr = manager(MemoryStorage::new());
        let original = ApiRequest::get("/api/scholarships/");
        assert_eq!(mgr.attach_auth(original.clone()), original);
    }

    #[test]
    fn test_attach_auth_skips_exempt_request() {
        let mgr = manager(MemoryStorage::with_session(&pair("A1", "R1")));
        let req = mgr.attach_auth(ApiRequest::post("/api/auth/token/").exempt());
        assert_eq!(req.bearer_token(), None);
    }

    #[test]
    fn test_attach_auth_replaces_stale_header() {
        let mgr = manager(MemoryStorage::with_session(&pair("A2", "R1")));
        let mut req = ApiRequest::get("/api/loans/");
        req.set_bearer("A1");
        let req = mgr.attach_auth(req);
        assert_eq!(req.bearer_token(), Some("A2"));
        assert_eq!(req.headers.len(), 1);
    }

    #[test]
    fn test_attach_auth_ignores_empty_token() {
        let storage = MemoryStorage::new();
        storage.set(ACCESS_TOKEN_KEY, "").unwrap();
        let mgr = manager(storage);
        let req = mgr.attach_auth(ApiRequest::get("/api/loans/"));
        assert_eq!(req.bearer_token(), None);
    }

    // =====================================================================
    // tokens
    // =====================================================================

    #[test]
    fn test_store_tokens_then_has_session() {
        let mgr = manager(MemoryStorage::new());
        assert!(!mgr.has_session());

        mgr.store_tokens(&pair("A1", "R1")).unwrap();

        assert!(mgr.has_session());
        assert_eq!(mgr.access_token().as_deref(), Some("A1"));
        assert_eq!(mgr.refresh_token().as_deref(), Some("R1"));
    }

    #[test]
    fn test_clear_tokens_does_not_notify() {
        let mgr = manager(MemoryStorage::with_session(&pair("A1", "R1")));
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        mgr.register_logout_handler(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        mgr.clear_tokens().unwrap();

        assert!(mgr.storage().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_clear_session_clears_and_notifies_signed_out() {
        let mgr = manager(MemoryStorage::with_session(&pair("A1", "R1")));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        mgr.register_logout_handler(move |reason| s.lock().unwrap().push(reason));

        mgr.clear_session().unwrap();

        assert!(!mgr.has_session());
        assert_eq!(*seen.lock().unwrap(), vec![LogoutReason::SignedOut]);
    }

    #[test]
    fn test_register_logout_handler_last_one_wins() {
        let mgr = manager(MemoryStorage::new());
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let f = Arc::clone(&first);
        mgr.register_logout_handler(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        });
        let s = Arc::clone(&second);
        mgr.register_logout_handler(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        mgr.clear_session().unwrap();

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clear_session_without_handler_is_fine() {
        let mgr = manager(MemoryStorage::with_session(&pair("A1", "R1")));
        mgr.clear_session().unwrap();
        assert!(mgr.storage().is_empty());
    }

    // =====================================================================
    // handle_response() short-circuits
    // =====================================================================

    #[tokio::test]
    async fn test_handle_response_passes_non_401_through() {
        let mgr = manager(MemoryStorage::with_session(&pair("A1", "R1")));
        let resp = ApiResponse::new(404, r#"{"detail":"Not found."}"#);
        let out = mgr
            .handle_response(ApiRequest::get("/api/loans/99/"), Ok(resp.clone()))
            .await
            .unwrap();
        assert_eq!(out, resp);
    }

    #[tokio::test]
    async fn test_handle_response_passes_transport_error_through() {
        let mgr = manager(MemoryStorage::with_session(&pair("A1", "R1")));
        let err = mgr
            .handle_response(ApiRequest::get("/"), Err(TransportError::Timeout))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Transport(TransportError::Timeout)));
        assert!(mgr.has_session(), "transport errors must not end the session");
    }

    #[tokio::test]
    async fn test_handle_response_retried_401_is_returned_as_is() {
        let mgr = manager(MemoryStorage::with_session(&pair("A1", "R1")));
        let mut req = ApiRequest::get("/api/users/me/");
        req.retried = true;
        let out = mgr
            .handle_response(req, Ok(ApiResponse::new(401, "")))
            .await
            .unwrap();
        assert!(out.is_unauthorized());
        assert!(mgr.has_session());
    }

    #[tokio::test]
    async fn test_refresh_state_starts_idle() {
        let mgr = manager(MemoryStorage::new());
        assert_eq!(mgr.refresh_state(), RefreshState::Idle);
    }
}
