//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `BABY_GUARD_API_URL` - Base URL of the Baby Guard API (e.g. `https://api.babyguard.app`)
//!
//! ## Optional
//! - `BABY_GUARD_STATE_PATH` - Local state file (default: `.baby-guard/state.json`)
//! - `BABY_GUARD_HTTP_TIMEOUT_SECS` - Per-request timeout (default: 30)
//! - `BABY_GUARD_OTP_COOLDOWN_SECS` - OTP resend cooldown (default: 30)
//! - `BABY_GUARD_CATALOG_TTL_SECS` - Product listing cache TTL (default: 300)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_STATE_PATH: &str = ".baby-guard/state.json";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_OTP_COOLDOWN_SECS: u64 = 30;
const DEFAULT_CATALOG_TTL_SECS: u64 = 300;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront client configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Base URL of the remote API. Paths like `/api/carts` are joined onto it.
    pub api_url: Url,
    /// Where the persisted client state lives.
    pub state_path: PathBuf,
    /// Timeout applied to every HTTP request.
    pub http_timeout: Duration,
    /// Resend cooldown for payment OTPs.
    pub otp_cooldown: Duration,
    /// TTL for cached product listings.
    pub catalog_ttl: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g. "production", "staging")
    pub sentry_environment: Option<String>,
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_url = parse_api_url("BABY_GUARD_API_URL", &get_required_env("BABY_GUARD_API_URL")?)?;
        let state_path = PathBuf::from(get_env_or_default(
            "BABY_GUARD_STATE_PATH",
            DEFAULT_STATE_PATH,
        ));

        Ok(Self {
            api_url,
            state_path,
            http_timeout: get_duration_secs("BABY_GUARD_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?,
            otp_cooldown: get_duration_secs("BABY_GUARD_OTP_COOLDOWN_SECS", DEFAULT_OTP_COOLDOWN_SECS)?,
            catalog_ttl: get_duration_secs("BABY_GUARD_CATALOG_TTL_SECS", DEFAULT_CATALOG_TTL_SECS)?,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Configuration pointing at `api_url` with every other value defaulted.
    ///
    /// Used by tests and by embedders that do not read the environment.
    #[must_use]
    pub fn for_api(api_url: Url, state_path: impl Into<PathBuf>) -> Self {
        Self {
            api_url,
            state_path: state_path.into(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            otp_cooldown: Duration::from_secs(DEFAULT_OTP_COOLDOWN_SECS),
            catalog_ttl: Duration::from_secs(DEFAULT_CATALOG_TTL_SECS),
            sentry_dsn: None,
            sentry_environment: None,
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read a whole number of seconds, falling back to `default`.
fn get_duration_secs(key: &str, default: u64) -> Result<Duration, ConfigError> {
    match get_optional_env(key) {
        None => Ok(Duration::from_secs(default)),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
    }
}

/// Parse the API base URL. Only http and https are accepted.
fn parse_api_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be an absolute URL".to_string(),
        ));
    }

    Ok(url)
}
