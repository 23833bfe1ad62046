//! Authentication and profile endpoints.

use reqwest::Method;
use tracing::instrument;

use super::types::{AuthResponse, LoginRequest, SignupRequest, UserEnvelope, UserProfile};
use super::{ApiClient, ApiError};

impl ApiClient {
    /// `POST /api/auth/signup`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server rejects the form.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn signup(&self, request: &SignupRequest) -> Result<AuthResponse, ApiError> {
        let builder = self
            .request(Method::POST, &["api", "auth", "signup"])
            .await?
            .json(request);
        self.send_json(builder).await
    }

    /// `POST /api/auth/login`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the credentials are rejected.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, ApiError> {
        let builder = self
            .request(Method::POST, &["api", "auth", "login"])
            .await?
            .json(request);
        self.send_json(builder).await
    }

    /// `GET /api/user/me` (bearer auth).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the token is rejected.
    #[instrument(skip(self))]
    pub async fn me(&self) -> Result<UserProfile, ApiError> {
        let builder = self.request(Method::GET, &["api", "user", "me"]).await?;
        let envelope: UserEnvelope = self.send_json(builder).await?;
        Ok(envelope.user)
    }
}
