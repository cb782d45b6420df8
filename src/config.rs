//! Configuration for walletgate.
//!
//! Settings are loaded with priority: env var > default. The CLI loads a
//! `.env` file via dotenvy before resolving; library consumers can also
//! construct [`Config`] directly.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;
use crate::session::retry::RetryBudget;

/// GraphQL endpoint used when `WALLETGATE_GRAPHQL_URL` is not set.
pub const DEFAULT_GRAPHQL_URL: &str = "http://localhost:3000/graphql";

/// Request timeout applied to every GraphQL call.
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Main configuration for the session engine and its GraphQL adapters.
#[derive(Debug, Clone)]
pub struct Config {
    /// GraphQL endpoint of the dashboard backend.
    pub endpoint: Url,
    /// Where the session token file lives.
    pub session_path: PathBuf,
    /// Per-request timeout for GraphQL calls.
    pub request_timeout: Duration,
    /// Signature retry budget for one challenge cycle.
    pub retry: RetryBudget,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Parsing a known-valid literal cannot fail.
            endpoint: Url::parse(DEFAULT_GRAPHQL_URL).expect("default endpoint URL is valid"),
            session_path: default_session_path(),
            request_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            retry: RetryBudget::default(),
        }
    }
}

impl Config {
    /// Resolve configuration from `WALLETGATE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let endpoint = match optional_env("WALLETGATE_GRAPHQL_URL") {
            Some(raw) => Url::parse(&raw).map_err(|e| ConfigError::InvalidValue {
                key: "WALLETGATE_GRAPHQL_URL".to_string(),
                message: format!("must be a valid URL: {e}"),
            })?,
            None => Config::default().endpoint,
        };

        let session_path = optional_env("WALLETGATE_SESSION_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_session_path);

        let timeout_ms = optional_env("WALLETGATE_TIMEOUT_MS")
            .map(|s| s.parse::<u64>())
            .transpose()
            .map_err(|e| ConfigError::InvalidValue {
                key: "WALLETGATE_TIMEOUT_MS".to_string(),
                message: format!("must be a positive integer: {e}"),
            })?
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        if timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "WALLETGATE_TIMEOUT_MS".to_string(),
                message: "must be > 0".to_string(),
            });
        }

        let max_attempts = optional_env("WALLETGATE_SIGN_MAX_ATTEMPTS")
            .map(|s| s.parse::<u32>())
            .transpose()
            .map_err(|e| ConfigError::InvalidValue {
                key: "WALLETGATE_SIGN_MAX_ATTEMPTS".to_string(),
                message: format!("must be a non-negative integer: {e}"),
            })?
            .unwrap_or_else(|| RetryBudget::default().max_attempts);

        let retry_delay_ms = optional_env("WALLETGATE_SIGN_RETRY_DELAY_MS")
            .map(|s| s.parse::<u64>())
            .transpose()
            .map_err(|e| ConfigError::InvalidValue {
                key: "WALLETGATE_SIGN_RETRY_DELAY_MS".to_string(),
                message: format!("must be a non-negative integer: {e}"),
            })?
            .map(Duration::from_millis)
            .unwrap_or_else(|| RetryBudget::default().delay);

        Ok(Self {
            endpoint,
            session_path,
            request_timeout: Duration::from_millis(timeout_ms),
            retry: RetryBudget::new(max_attempts, retry_delay_ms),
        })
    }
}

/// Default session file path: `~/.walletgate/session.json`.
pub fn default_session_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".walletgate")
        .join("session.json")
}

/// Read an env var, treating unset and blank values the same.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
