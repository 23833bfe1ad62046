//! Payment OTP endpoints.

use baby_guard_core::{CartId, OtpCode};
use reqwest::Method;
use tracing::instrument;

use super::types::VerifyOtpRequest;
use super::{ApiClient, ApiError};

impl ApiClient {
    /// `POST /api/payment/verify-otp`.
    ///
    /// # Errors
    ///
    /// Returns an error if the code is rejected or the request fails.
    #[instrument(skip(self, code), fields(cart_id = %cart_id))]
    pub async fn verify_otp(&self, cart_id: &CartId, code: &OtpCode) -> Result<(), ApiError> {
        let builder = self
            .request(Method::POST, &["api", "payment", "verify-otp"])
            .await?
            .json(&VerifyOtpRequest {
                cart_id,
                code: code.as_string(),
            });
        self.send_empty(builder).await
    }

    /// `PATCH /api/payment/resend-otp/:id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server refuses to send a new code.
    #[instrument(skip(self), fields(cart_id = %cart_id))]
    pub async fn resend_otp(&self, cart_id: &CartId) -> Result<(), ApiError> {
        let builder = self
            .request(Method::PATCH, &["api", "payment", "resend-otp", cart_id.as_str()])
            .await?;
        self.send_empty(builder).await
    }

    /// `DELETE /api/payment/cancel/:id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pending payment cannot be cancelled.
    #[instrument(skip(self), fields(cart_id = %cart_id))]
    pub async fn cancel_payment(&self, cart_id: &CartId) -> Result<(), ApiError> {
        let builder = self
            .request(Method::DELETE, &["api", "payment", "cancel", cart_id.as_str()])
            .await?;
        self.send_empty(builder).await
    }
}
