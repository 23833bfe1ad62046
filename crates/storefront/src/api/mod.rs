//! Baby Guard REST API client.
//!
//! # Architecture
//!
//! - Plain JSON over HTTP via `reqwest`; the server is the source of truth
//! - Bearer token held in memory, set by the session service on login
//! - Every request carries an `x-request-id` for log correlation
//! - Endpoint groups live in sibling modules as `impl ApiClient` blocks
//!
//! # Responses
//!
//! Successful bodies are wrapped in an envelope (`{ data }` or `{ user }`).
//! Error bodies carry `message`, an optional `code` and an optional `errors`
//! map keyed by field name.

mod auth;
mod carts;
mod content;
mod payment;
mod products;
pub mod types;

use std::collections::BTreeMap;
use std::sync::Arc;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::RwLock;
use url::Url;
use uuid::Uuid;

use crate::config::StorefrontConfig;

/// The HTTP header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Errors that can occur when talking to the Baby Guard API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed (connect, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned a non-success status.
    #[error("API error: {status} - {message}")]
    Status {
        status: u16,
        message: String,
        code: Option<String>,
        errors: BTreeMap<String, String>,
    },

    /// Response body could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Endpoint URL could not be built from the configured base.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// `{ data: T }` envelope used by most endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct DataEnvelope<T> {
    pub data: T,
}

/// Error body returned by the API.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    errors: Option<serde_json::Value>,
}

/// Client for the Baby Guard REST API.
///
/// Cheap to clone; clones share the HTTP connection pool and the token.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    base_url: Url,
    /// Bearer token of the current session.
    token: RwLock<Option<SecretString>>,
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &StorefrontConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.http_timeout)
            .user_agent(concat!("baby-guard-storefront/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                client,
                base_url: config.api_url.clone(),
                token: RwLock::new(None),
            }),
        })
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// Set the bearer token used for authenticated calls.
    pub async fn set_token(&self, token: SecretString) {
        *self.inner.token.write().await = Some(token);
    }

    /// Drop the bearer token (logout).
    pub async fn clear_token(&self) {
        *self.inner.token.write().await = None;
    }

    /// Whether a bearer token is currently set.
    pub async fn has_token(&self) -> bool {
        self.inner.token.read().await.is_some()
    }

    // =========================================================================
    // Request plumbing
    // =========================================================================

    /// Build an endpoint URL from path segments.
    ///
    /// Segments are percent-encoded, so ids can never alter the path.
    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidUrl(self.inner.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Start a request with the bearer token and a fresh request id.
    async fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, ApiError> {
        let url = self.url(segments)?;
        let request_id = Uuid::new_v4().to_string();
        tracing::debug!(%method, %url, request_id = %request_id, "API request");

        let mut builder = self
            .inner
            .client
            .request(method, url)
            .header(REQUEST_ID_HEADER, request_id);

        if let Some(token) = self.inner.token.read().await.as_ref() {
            builder = builder.bearer_auth(token.expose_secret());
        }

        Ok(builder)
    }

    /// Send a request and decode the JSON body.
    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = check_status(builder.send().await?).await?;
        let text = response.text().await?;

        serde_json::from_str(&text).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %text.chars().take(500).collect::<String>(),
                "Failed to parse API response"
            );
            ApiError::Parse(e.to_string())
        })
    }

    /// Send a request and discard the body.
    async fn send_empty(&self, builder: RequestBuilder) -> Result<(), ApiError> {
        check_status(builder.send().await?).await?;
        Ok(())
    }
}

/// Turn a non-success response into `ApiError::Status`.
async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();

    tracing::debug!(
        status = %status,
        body = %text.chars().take(500).collect::<String>(),
        "API returned non-success status"
    );

    Err(ApiError::Status {
        status: status.as_u16(),
        message: body
            .message
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("Request failed").to_string()),
        code: body.code,
        errors: body.errors.map(flatten_field_errors).unwrap_or_default(),
    })
}

/// Normalize the `errors` payload into `field -> message`.
///
/// Accepts `{ field: "msg" }`, `{ field: { message } }`, `{ field: ["msg"] }`
/// and express-validator style `[{ path, msg }]`.
fn flatten_field_errors(value: serde_json::Value) -> BTreeMap<String, String> {
    fn message_of(value: &serde_json::Value) -> Option<String> {
        match value {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Array(items) => items.iter().find_map(message_of),
            serde_json::Value::Object(map) => ["message", "msg"]
                .iter()
                .find_map(|key| map.get(*key).and_then(message_of)),
            _ => None,
        }
    }

    let mut fields = BTreeMap::new();
    match value {
        serde_json::Value::Object(map) => {
            for (field, detail) in &map {
                if let Some(message) = message_of(detail) {
                    fields.insert(field.clone(), message);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in &items {
                let field = ["path", "param", "field"]
                    .iter()
                    .find_map(|key| item.get(*key).and_then(serde_json::Value::as_str));
                if let (Some(field), Some(message)) = (field, message_of(item)) {
                    fields.entry(field.to_string()).or_insert(message);
                }
            }
        }
        _ => {}
    }
    fields
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(base: &str) -> ApiClient {
        let config = StorefrontConfig::for_api(Url::parse(base).unwrap(), "state.json");
        ApiClient::new(&config).unwrap()
    }

    #[test]
    fn test_url_joins_segments() {
        let api = client("https://api.example.com");
        let url = api.url(&["api", "carts", "c1", "products"]).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/api/carts/c1/products");
    }

    #[test]
    fn test_url_keeps_base_path_and_encodes_ids() {
        let api = client("https://example.com/v1/");
        let url = api.url(&["api", "carts", "a/b"]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/v1/api/carts/a%2Fb");
    }

    #[test]
    fn test_flatten_field_errors_object() {
        let fields = flatten_field_errors(json!({
            "email": "Email already registered",
            "password": { "message": "Too short" },
            "phone": ["Invalid phone", "ignored"]
        }));
        assert_eq!(fields["email"], "Email already registered");
        assert_eq!(fields["password"], "Too short");
        assert_eq!(fields["phone"], "Invalid phone");
    }

    #[test]
    fn test_flatten_field_errors_array() {
        let fields = flatten_field_errors(json!([
            { "path": "name", "msg": "Name is required" },
            { "path": "name", "msg": "second" },
            { "msg": "no field" }
        ]));
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["name"], "Name is required");
    }

    #[tokio::test]
    async fn test_token_lifecycle() {
        let api = client("http://localhost:1");
        assert!(!api.has_token().await);
        api.set_token(SecretString::from("abc")).await;
        assert!(api.has_token().await);
        api.clear_token().await;
        assert!(!api.has_token().await);
    }
}
