//! Unified error handling with Sentry integration.
//!
//! Every service call site converts failures into a [`ClientError`], reports
//! it (log, optional Sentry capture, transient [`Notice`]) and returns it.
//! Nothing is retried and nothing is left to propagate to a global handler.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::api::ApiError;
use crate::notify::{Notice, Notifier};
use crate::storage::StorageError;

/// Structured error code the API uses for an unavailable product.
pub const OUT_OF_STOCK_CODE: &str = "OUT_OF_STOCK";

/// Field-level validation messages keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(pub BTreeMap<String, String>);

impl FieldErrors {
    /// Record a message for `field`. The first message per field wins.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_insert_with(|| message.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// `Ok(())` when nothing was recorded, otherwise a validation error.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` carrying these field errors.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ClientError::Validation(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|(field, message)| format!("{field}: {message}"))
            .collect::<Vec<_>>()
            .join("; ");
        f.write_str(&joined)
    }
}

/// Library-level error type for the storefront client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure, server error or unparseable response.
    #[error("API error: {0}")]
    Api(#[source] ApiError),

    /// Local state could not be read or written.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Server rejected the credential (401).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed (403, or admin check failed locally).
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found (404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request rejected without field details (400).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Request rejected with field-level errors (400 with `errors`).
    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    /// Resource is in the wrong state for the operation (409).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Too many requests (429).
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Product cannot be added because the stock ran out.
    #[error("Out of stock: {0}")]
    OutOfStock(String),

    /// Operation needs a cart id but none is stored.
    #[error("No cart id available")]
    MissingCartId,

    /// Operation needs a session but nobody is logged in.
    #[error("Not logged in")]
    NotLoggedIn,

    /// OTP submitted before all digits were entered.
    #[error("Incomplete code: {entered} of 6 digits entered")]
    IncompleteOtp { entered: usize },

    /// OTP resend requested while the cooldown is still running.
    #[error("Resend available in {remaining_secs} seconds")]
    CooldownActive { remaining_secs: u64 },

    /// Operation not valid in the current flow state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The owning view scope ended before the operation completed.
    #[error("Cancelled")]
    Cancelled,
}

impl ClientError {
    /// HTTP status behind this error, when it came from the server.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api(ApiError::Status { status, .. }) => Some(*status),
            Self::Unauthorized(_) => Some(401),
            Self::Forbidden(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::BadRequest(_) | Self::Validation(_) => Some(400),
            Self::Conflict(_) => Some(409),
            Self::RateLimited(_) => Some(429),
            _ => None,
        }
    }

    /// Whether this error should be captured to Sentry.
    ///
    /// Only failures the user cannot fix are captured: transport problems,
    /// server errors, bad responses and local storage failures.
    #[must_use]
    pub const fn is_unexpected(&self) -> bool {
        matches!(self, Self::Api(_) | Self::Storage(_))
    }

    /// User-facing text. Never exposes transport internals.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Api(ApiError::Http(_)) => {
                "Network error. Please check your connection and try again.".to_string()
            }
            Self::Api(ApiError::Status { status, .. }) if *status >= 500 => {
                "The server had a problem. Please try again later.".to_string()
            }
            Self::Api(ApiError::Status { message, .. }) => {
                non_empty_or(message, "Something went wrong. Please try again.")
            }
            Self::Api(ApiError::Parse(_) | ApiError::InvalidUrl(_)) => {
                "Unexpected response from the server.".to_string()
            }
            Self::Storage(_) => "Could not save local data.".to_string(),
            Self::Unauthorized(_) => "Your session has expired. Please log in again.".to_string(),
            Self::Forbidden(_) => "You do not have permission to do that.".to_string(),
            Self::NotFound(message) => non_empty_or(message, "Not found."),
            Self::BadRequest(message) | Self::Conflict(message) => {
                non_empty_or(message, "The request could not be completed.")
            }
            Self::Validation(fields) => format!("Please check the form: {fields}"),
            Self::RateLimited(message) => {
                non_empty_or(message, "Too many attempts. Please try again later.")
            }
            Self::OutOfStock(_) => "Sorry, this product is out of stock.".to_string(),
            Self::MissingCartId => "No active cart. Add a product to start a new cart.".to_string(),
            Self::NotLoggedIn => "Please log in first.".to_string(),
            Self::IncompleteOtp { .. } => "Please enter all 6 digits of the code.".to_string(),
            Self::CooldownActive { remaining_secs } => {
                format!("Please wait {remaining_secs} seconds before requesting a new code.")
            }
            Self::InvalidState(message) => message.clone(),
            Self::Cancelled => "Request cancelled.".to_string(),
        }
    }

    /// The server-provided message, if any, for errors that carry one.
    #[must_use]
    pub fn server_message(&self) -> Option<&str> {
        let message = match self {
            Self::Api(ApiError::Status { message, .. })
            | Self::Unauthorized(message)
            | Self::NotFound(message)
            | Self::BadRequest(message)
            | Self::Conflict(message)
            | Self::RateLimited(message)
            | Self::OutOfStock(message) => message.as_str(),
            _ => return None,
        };
        (!message.trim().is_empty()).then_some(message)
    }
}

impl From<ApiError> for ClientError {
    fn from(err: ApiError) -> Self {
        classify(err)
    }
}

/// Map an HTTP-layer error onto the most specific [`ClientError`].
#[must_use]
pub fn classify(err: ApiError) -> ClientError {
    let ApiError::Status {
        status,
        message,
        code,
        errors,
    } = err
    else {
        return ClientError::Api(err);
    };

    if code.as_deref() == Some(OUT_OF_STOCK_CODE) {
        return ClientError::OutOfStock(message);
    }

    match status {
        400 if !errors.is_empty() => ClientError::Validation(FieldErrors(errors)),
        400 => ClientError::BadRequest(message),
        401 => ClientError::Unauthorized(message),
        403 => ClientError::Forbidden(message),
        404 => ClientError::NotFound(message),
        409 => ClientError::Conflict(message),
        429 => ClientError::RateLimited(message),
        _ => ClientError::Api(ApiError::Status {
            status,
            message,
            code,
            errors,
        }),
    }
}

fn non_empty_or(message: &str, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message.to_string()
    }
}

/// Result type alias for `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Log an error, capture it to Sentry if unexpected, and notify the user.
///
/// `message` overrides [`ClientError::user_message`] when the call site has a
/// more specific text.
pub fn report(notifier: &dyn Notifier, context: &str, err: &ClientError, message: Option<String>) {
    if err.is_unexpected() {
        let event_id = sentry::capture_error(err);
        tracing::error!(
            error = %err,
            sentry_event_id = %event_id,
            context,
            "Request failed"
        );
    } else {
        tracing::warn!(error = %err, context, "Request rejected");
    }

    notifier.notify(Notice::error(message.unwrap_or_else(|| err.user_message())));
}

/// Set the Sentry user context after login.
pub fn set_sentry_user(role: &str) {
    sentry::configure_scope(|scope| {
        scope.set_tag("role", role);
    });
}

/// Clear the Sentry user context on logout.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.remove_tag("role");
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added product", Some(&[("product_id", "665f1c")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn status(status: u16, message: &str) -> ApiError {
        ApiError::Status {
            status,
            message: message.to_string(),
            code: None,
            errors: BTreeMap::new(),
        }
    }

    #[test]
    fn test_classify_statuses() {
        assert!(matches!(classify(status(401, "x")), ClientError::Unauthorized(_)));
        assert!(matches!(classify(status(403, "x")), ClientError::Forbidden(_)));
        assert!(matches!(classify(status(404, "x")), ClientError::NotFound(_)));
        assert!(matches!(classify(status(400, "x")), ClientError::BadRequest(_)));
        assert!(matches!(classify(status(409, "x")), ClientError::Conflict(_)));
        assert!(matches!(classify(status(429, "x")), ClientError::RateLimited(_)));
        assert!(matches!(classify(status(502, "x")), ClientError::Api(_)));
    }

    #[test]
    fn test_classify_validation_and_stock() {
        let mut errors = BTreeMap::new();
        errors.insert("email".to_string(), "already used".to_string());
        let err = classify(ApiError::Status {
            status: 400,
            message: "Validation failed".to_string(),
            code: None,
            errors,
        });
        let ClientError::Validation(fields) = err else {
            panic!("expected validation error");
        };
        assert_eq!(fields.get("email"), Some("already used"));

        let err = classify(ApiError::Status {
            status: 400,
            message: "Only 0 left".to_string(),
            code: Some(OUT_OF_STOCK_CODE.to_string()),
            errors: BTreeMap::new(),
        });
        assert!(matches!(err, ClientError::OutOfStock(_)));
        assert_eq!(err.user_message(), "Sorry, this product is out of stock.");
    }

    #[test]
    fn test_user_message_hides_internals() {
        let err = ClientError::Api(status(500, "stack trace at line 42"));
        assert_eq!(
            err.user_message(),
            "The server had a problem. Please try again later."
        );
        assert!(err.is_unexpected());
    }

    #[test]
    fn test_user_message_uses_server_text_or_fallback() {
        assert_eq!(
            ClientError::BadRequest("Cart is empty".to_string()).user_message(),
            "Cart is empty"
        );
        assert_eq!(
            ClientError::RateLimited(String::new()).user_message(),
            "Too many attempts. Please try again later."
        );
        assert_eq!(
            ClientError::CooldownActive { remaining_secs: 12 }.user_message(),
            "Please wait 12 seconds before requesting a new code."
        );
    }

    #[test]
    fn test_status_and_server_message() {
        let err = classify(status(404, "Order not found"));
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.server_message(), Some("Order not found"));
        assert_eq!(ClientError::MissingCartId.status(), None);
        assert_eq!(ClientError::BadRequest("  ".to_string()).server_message(), None);
    }

    #[test]
    fn test_field_errors_into_result() {
        assert!(FieldErrors::default().into_result().is_ok());

        let mut fields = FieldErrors::default();
        fields.add("password", "too short");
        fields.add("password", "ignored");
        let err = fields.into_result().unwrap_err();
        assert_eq!(err.to_string(), "Validation failed: password: too short");
    }
}
