//! GraphQL transport for the dashboard backend.
//!
//! One [`GraphqlClient`] serves every operation in the crate. Each request
//! carries `Authorization: Bearer <token>` when the shared [`TokenCell`]
//! holds a token, mirroring how the dashboard attaches the persisted
//! credential to all outbound API calls.

pub mod auth;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tokio::sync::RwLock;
use url::Url;

use crate::error::TransportError;

/// Shared holder of the current bearer token.
///
/// Single writer (the session engine), many readers (every outbound
/// request). Cleared on disconnect, logout, and invalidation so that no
/// request is sent with a credential the engine no longer trusts.
#[derive(Default)]
pub struct TokenCell {
    inner: RwLock<Option<SecretString>>,
}

impl TokenCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current token.
    pub async fn set(&self, token: SecretString) {
        *self.inner.write().await = Some(token);
    }

    /// Drop the current token. Idempotent.
    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }

    /// Current token, if any.
    pub async fn bearer(&self) -> Option<SecretString> {
        self.inner.read().await.clone()
    }

    pub async fn is_set(&self) -> bool {
        self.inner.read().await.is_some()
    }
}

impl std::fmt::Debug for TokenCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the token itself.
        f.debug_struct("TokenCell").finish_non_exhaustive()
    }
}

/// Thin GraphQL-over-HTTP client.
pub struct GraphqlClient {
    http: Client,
    endpoint: Url,
    token: Arc<TokenCell>,
}

impl GraphqlClient {
    pub fn new(endpoint: Url, request_timeout: Duration, token: Arc<TokenCell>) -> Self {
        Self {
            http: Client::builder()
                .timeout(request_timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            endpoint,
            token,
        }
    }

    /// Execute one GraphQL operation and return its `data` payload.
    ///
    /// HTTP failures, non-success status codes, and entries in the GraphQL
    /// `errors` array all surface as [`TransportError`].
    pub async fn execute(&self, query: &str, variables: Value) -> Result<Value, TransportError> {
        let mut request = self
            .http
            .post(self.endpoint.clone())
            .json(&json!({ "query": query, "variables": variables }));
        if let Some(token) = self.token.bearer().await {
            request = request.header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", token.expose_secret()),
            );
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        decode_graphql_body(body)
    }
}

impl std::fmt::Debug for GraphqlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphqlClient")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

/// Split a GraphQL response body into its `data` payload or an error.
fn decode_graphql_body(body: Value) -> Result<Value, TransportError> {
    if let Some(errors) = body.get("errors").and_then(Value::as_array)
        && !errors.is_empty()
    {
        let message = errors
            .iter()
            .filter_map(|e| e.get("message").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(TransportError::Graphql {
            message: if message.is_empty() {
                "unspecified GraphQL error".to_string()
            } else {
                message
            },
        });
    }

    match body.get("data") {
        Some(data) if !data.is_null() => Ok(data.clone()),
        _ => Err(TransportError::MalformedResponse {
            field: "data".to_string(),
        }),
    }
}
