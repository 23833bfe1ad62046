//! Session handling: signup, login, logout and restore.
//!
//! The bearer token is kept in memory as a [`SecretString`] and written to
//! the local store so the session survives restarts. Tokens that look like
//! JWTs have their `exp` claim checked on restore.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use baby_guard_core::{Email, Role};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::instrument;

use crate::api::ApiClient;
use crate::api::types::{AuthResponse, LoginRequest, SignupRequest, UserProfile};
use crate::cart::CartSynchronizer;
use crate::error::{
    ClientError, FieldErrors, Result, add_breadcrumb, clear_sentry_user, report, set_sentry_user,
};
use crate::notify::{Notice, Notifier};
use crate::storage::LocalStore;

/// Minimum password length accepted at signup.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// An authenticated session.
pub struct Session {
    token: SecretString,
    role: Role,
    expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.role)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl Session {
    #[must_use]
    pub fn new(token: &str, role: Role) -> Self {
        Self {
            expires_at: token_expiry(token),
            token: SecretString::from(token.to_string()),
            role,
        }
    }

    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub const fn token(&self) -> &SecretString {
        &self.token
    }

    /// Expiry decoded from the token, if it is a JWT with an `exp` claim.
    #[must_use]
    pub const fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

#[derive(Deserialize)]
struct Claims {
    exp: Option<i64>,
}

/// Read the `exp` claim of a JWT without verifying it.
///
/// Anything that is not a three-part token with a JSON payload yields `None`.
fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut parts = token.split('.');
    let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    DateTime::from_timestamp(claims.exp?, 0)
}

/// Owns the session keys of the local store.
#[derive(Clone)]
pub struct SessionService {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    api: ApiClient,
    store: LocalStore,
    cart: CartSynchronizer,
    notifier: Arc<dyn Notifier>,
    current: RwLock<Option<Arc<Session>>>,
}

impl SessionService {
    pub fn new(
        api: ApiClient,
        store: LocalStore,
        cart: CartSynchronizer,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                api,
                store,
                cart,
                notifier,
                current: RwLock::new(None),
            }),
        }
    }

    /// Create an account and log in.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` without a request when the form is
    /// invalid locally, or any error from the signup request.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn signup(&self, request: SignupRequest) -> Result<Arc<Session>> {
        let result = async {
            let request = validate_signup(request)?;
            let response = self.inner.api.signup(&request).await?;
            self.establish(response).await
        }
        .await;

        match result {
            Ok(session) => {
                self.inner
                    .notifier
                    .notify(Notice::success("Account created. Welcome to Baby Guard!"));
                Ok(session)
            }
            Err(e) => Err(self.fail("session.signup", e, None)),
        }
    }

    /// Log in and pull the user's pending cart.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` for a malformed email or empty
    /// password, or any error from the login request.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<Arc<Session>> {
        let result = async {
            let mut fields = FieldErrors::default();
            if password.is_empty() {
                fields.add("password", "Password is required");
            }
            let email = match Email::parse(email) {
                Ok(email) => email,
                Err(e) => {
                    fields.add("email", e.to_string());
                    return Err(ClientError::Validation(fields));
                }
            };
            fields.into_result()?;

            let request = LoginRequest {
                email,
                password: password.to_string(),
            };
            let response = self.inner.api.login(&request).await?;
            self.establish(response).await
        }
        .await;

        let session = result.map_err(|e| {
            let message = matches!(e, ClientError::Unauthorized(_))
                .then(|| "Invalid email or password.".to_string());
            self.fail("session.login", e, message)
        })?;

        self.inner
            .notifier
            .notify(Notice::success("Logged in successfully."));
        if let Err(e) = self.inner.cart.refresh().await {
            tracing::warn!(error = %e, "Could not load pending cart after login");
        }
        Ok(session)
    }

    /// Drop the session and all local cart state. No server call.
    ///
    /// # Errors
    ///
    /// Returns an error if the state file cannot be written.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        self.inner.api.clear_token().await;
        *self.inner.current.write().await = None;
        clear_sentry_user();

        let result = async {
            self.inner.store.clear_session().await?;
            self.inner.cart.reset().await
        }
        .await;

        match result {
            Ok(()) => {
                tracing::info!("Logged out");
                self.inner.notifier.notify(Notice::info("Logged out."));
                Ok(())
            }
            Err(e) => Err(self.fail("session.logout", e, None)),
        }
    }

    /// Load the persisted session at startup. An expired token is discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if discarding an expired session fails to persist.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Result<Option<Arc<Session>>> {
        let (token, role) = self.inner.store.session().await;
        let Some(token) = token else {
            return Ok(None);
        };

        let session = Session::new(&token, role.unwrap_or_default());
        if session.is_expired_at(Utc::now()) {
            tracing::info!("Stored session expired; discarding");
            self.inner.store.clear_session().await?;
            return Ok(None);
        }

        let session = Arc::new(session);
        self.activate(Arc::clone(&session)).await;
        tracing::debug!(role = %session.role(), "Session restored");
        Ok(Some(session))
    }

    /// Fetch and cache the current user's profile.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotLoggedIn` without a session, or any error
    /// from the profile request.
    #[instrument(skip(self))]
    pub async fn me(&self) -> Result<UserProfile> {
        let result = async {
            self.current().await.ok_or(ClientError::NotLoggedIn)?;
            let profile = self.inner.api.me().await?;
            self.inner.store.set_user_data(&profile).await?;
            Ok(profile)
        }
        .await;
        result.map_err(|e| self.fail("session.me", e, None))
    }

    /// Profile cached by the last [`me`](Self::me) call.
    pub async fn cached_profile(&self) -> Option<UserProfile> {
        self.inner.store.user_data().await
    }

    pub async fn current(&self) -> Option<Arc<Session>> {
        self.inner.current.read().await.clone()
    }

    pub async fn is_logged_in(&self) -> bool {
        self.inner.current.read().await.is_some()
    }

    pub async fn role(&self) -> Option<Role> {
        self.inner.current.read().await.as_ref().map(|s| s.role())
    }

    /// The current session, or a notice asking the user to log in.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotLoggedIn` without a session.
    pub async fn require_login(&self) -> Result<Arc<Session>> {
        self.current()
            .await
            .ok_or_else(|| self.fail("session.require_login", ClientError::NotLoggedIn, None))
    }

    /// The current session if it belongs to an admin.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotLoggedIn` without a session and
    /// `ClientError::Forbidden` for a customer.
    pub async fn require_admin(&self) -> Result<Arc<Session>> {
        let session = self.require_login().await?;
        if !session.role().is_admin() {
            let err = ClientError::Forbidden("admin role required".to_string());
            return Err(self.fail("session.require_admin", err, None));
        }
        Ok(session)
    }

    async fn establish(&self, response: AuthResponse) -> Result<Arc<Session>> {
        self.inner
            .store
            .set_session(&response.token, response.role)
            .await?;
        let session = Arc::new(Session::new(&response.token, response.role));
        self.activate(Arc::clone(&session)).await;
        add_breadcrumb("auth", "Session started", Some(&[("role", response.role.as_str())]));
        tracing::info!(role = %response.role, "Session started");
        Ok(session)
    }

    async fn activate(&self, session: Arc<Session>) {
        self.inner
            .api
            .set_token(SecretString::from(session.token().expose_secret().to_string()))
            .await;
        set_sentry_user(session.role().as_str());
        *self.inner.current.write().await = Some(session);
    }

    fn fail(&self, context: &str, err: ClientError, message: Option<String>) -> ClientError {
        report(self.inner.notifier.as_ref(), context, &err, message);
        err
    }
}

/// Check a signup form before it is sent.
fn validate_signup(mut request: SignupRequest) -> Result<SignupRequest> {
    let mut fields = FieldErrors::default();

    request.name = request.name.trim().to_string();
    if request.name.is_empty() {
        fields.add("name", "Name is required");
    }
    match Email::parse(&request.email) {
        Ok(email) => request.email = email.into(),
        Err(e) => fields.add("email", e.to_string()),
    }
    if request.password.chars().count() < MIN_PASSWORD_LENGTH {
        fields.add(
            "password",
            format!("Password must be at least {MIN_PASSWORD_LENGTH} characters"),
        );
    }
    request.phone = request.phone.trim().to_string();
    if request.phone.is_empty() {
        fields.add("phone", "Phone number is required");
    }

    fields.into_result()?;
    Ok(request)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn jwt(payload: &str) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256"}"#),
            URL_SAFE_NO_PAD.encode(payload)
        )
    }

    fn form() -> SignupRequest {
        SignupRequest {
            name: " Mona ".to_string(),
            email: "Mona@Example.com".to_string(),
            password: "longenough".to_string(),
            phone: "01000000000".to_string(),
        }
    }

    #[test]
    fn test_token_expiry_decoded() {
        let session = Session::new(&jwt(r#"{"id":"u1","exp":1700000000}"#), Role::Admin);
        assert_eq!(session.expires_at().unwrap().timestamp(), 1_700_000_000);
        assert!(session.is_expired_at(Utc::now()));
    }

    #[test]
    fn test_opaque_token_never_expires() {
        let session = Session::new("opaque-token", Role::Customer);
        assert!(session.expires_at().is_none());
        assert!(!session.is_expired_at(Utc::now()));
        assert!(token_expiry(&jwt(r#"{"id":"u1"}"#)).is_none());
        assert!(token_expiry("a.!!!.c").is_none());
    }

    #[test]
    fn test_debug_hides_token() {
        let session = Session::new("secret-token", Role::Customer);
        assert!(!format!("{session:?}").contains("secret-token"));
    }

    #[test]
    fn test_validate_signup_normalizes() {
        let request = validate_signup(form()).unwrap();
        assert_eq!(request.name, "Mona");
        assert_eq!(request.email, "mona@example.com");
    }

    #[test]
    fn test_validate_signup_collects_field_errors() {
        let request = SignupRequest {
            name: "  ".to_string(),
            email: "not-an-email".to_string(),
            password: "short".to_string(),
            phone: String::new(),
        };
        let Err(ClientError::Validation(fields)) = validate_signup(request) else {
            panic!("expected validation error");
        };
        assert!(fields.get("name").is_some());
        assert!(fields.get("email").is_some());
        assert_eq!(
            fields.get("password"),
            Some("Password must be at least 8 characters")
        );
        assert!(fields.get("phone").is_some());
    }
}
