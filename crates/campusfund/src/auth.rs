//! Sign-in, registration, and the signed-in user.

use std::sync::{PoisonError, RwLock};

use campusfund_protocol::{
    ApiRequest, Credentials, ProtocolError, Registration, TokenPair, UserProfile,
};
use campusfund_session::TokenStorage;
use campusfund_transport::Transport;

use crate::{ApiClient, CampusfundError};

/// Client-side authentication state on top of an [`ApiClient`].
///
/// ## Lifecycle
///
/// ```text
/// bootstrap() ──(tokens stored, profile ok)──→ signed in
///     │                                           │
///     └──(no tokens / rejected)──→ signed out ←───┘ logout() or expiry
///                                      │
///                                  login() ──→ signed in
/// ```
pub struct AuthService<T, S> {
    client: ApiClient<T, S>,
    user: RwLock<Option<UserProfile>>,
}

impl<T: Transport, S: TokenStorage> AuthService<T, S> {
    /// Creates the service. Nobody is signed in until
    /// [`bootstrap`](Self::bootstrap) or [`login`](Self::login) succeeds.
    pub fn new(client: ApiClient<T, S>) -> Self {
        Self {
            client,
            user: RwLock::new(None),
        }
    }

    /// The client this service signs in.
    pub fn client(&self) -> &ApiClient<T, S> {
        &self.client
    }

    /// The most recently fetched profile, or `None` once the session has
    /// ended.
    pub fn current_user(&self) -> Option<UserProfile> {
        if !self.client.session().has_session() {
            return None;
        }
        self.user.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Exchanges credentials for a token pair, stores it, and loads the
    /// user's profile.
    ///
    /// # Errors
    /// - [`CampusfundError::LoginRejected`] if the credentials are refused
    /// - [`CampusfundError::Protocol`] if the issued token pair is
    ///   incomplete; nothing is stored
    /// - [`CampusfundError::Session`] / [`CampusfundError::Protocol`] if
    ///   the request or the profile fetch fails
    pub async fn login(&self, credentials: &Credentials) -> Result<UserProfile, CampusfundError> {
        let request = ApiRequest::post(&self.client.config().token_path)
            .exempt()
            .with_json(credentials)?;
        let response = self.client.session().send(request).await?;
        if !response.is_success() {
            tracing::info!(status = response.status, "sign-in rejected");
            return Err(CampusfundError::LoginRejected {
                status: response.status,
            });
        }

        let tokens: TokenPair = response.json()?;
        if tokens.access.is_empty() || tokens.refresh.is_empty() {
            return Err(ProtocolError::InvalidMessage(
                "sign-in response carried an empty token".into(),
            )
            .into());
        }
        self.client.session().store_tokens(&tokens)?;
        tracing::info!(email = %credentials.email, "signed in");

        self.fetch_profile().await
    }

    /// Creates a student account. Does not sign in.
    ///
    /// # Errors
    /// [`CampusfundError::RegistrationRejected`] carries the API's field
    /// errors when the account is refused.
    pub async fn register(&self, registration: &Registration) -> Result<(), CampusfundError> {
        let request = ApiRequest::post(&self.client.config().register_path)
            .exempt()
            .with_json(registration)?;
        let response = self.client.session().send(request).await?;
        if !response.is_success() {
            return Err(CampusfundError::RegistrationRejected {
                status: response.status,
                body: response.text(),
            });
        }
        tracing::info!(email = %registration.email, "account registered");
        Ok(())
    }

    /// Loads the signed-in user's profile and remembers it.
    ///
    /// # Errors
    /// As [`ApiClient::get_json`].
    pub async fn fetch_profile(&self) -> Result<UserProfile, CampusfundError> {
        let profile: UserProfile = self
            .client
            .get_json(&self.client.config().profile_path)
            .await?;
        self.set_user(Some(profile.clone()));
        Ok(profile)
    }

    /// Restores the session persisted by an earlier run.
    ///
    /// Returns `Ok(None)` if no complete session is stored. If the stored
    /// session is rejected the tokens are cleared and the error returned.
    /// Other failures (network, server errors) leave the tokens in place.
    ///
    /// # Errors
    /// As [`fetch_profile`](Self::fetch_profile).
    pub async fn bootstrap(&self) -> Result<Option<UserProfile>, CampusfundError> {
        if !self.client.session().has_session() {
            self.set_user(None);
            return Ok(None);
        }

        match self.fetch_profile().await {
            Ok(profile) => Ok(Some(profile)),
            Err(e) if e.is_unauthorized() => {
                tracing::info!(error = %e, "stored session rejected");
                self.set_user(None);
                if let Err(clear) = self.client.session().clear_tokens() {
                    tracing::warn!(error = %clear, "failed to clear rejected session");
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Re-fetches the profile, e.g. after the user edited it. Same
    /// semantics as [`bootstrap`](Self::bootstrap).
    ///
    /// # Errors
    /// As [`bootstrap`](Self::bootstrap).
    pub async fn refresh_user(&self) -> Result<Option<UserProfile>, CampusfundError> {
        self.bootstrap().await
    }

    /// Signs out: forgets the user, removes both tokens, and publishes
    /// [`SessionNotice::SignedOut`](crate::SessionNotice::SignedOut).
    ///
    /// # Errors
    /// [`CampusfundError::Session`] if token storage can't be cleared.
    pub fn logout(&self) -> Result<(), CampusfundError> {
        self.set_user(None);
        self.client.session().clear_session()?;
        tracing::info!("signed out");
        Ok(())
    }

    fn set_user(&self, user: Option<UserProfile>) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = user;
    }
}
