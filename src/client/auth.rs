//! Challenge and authentication adapters over the GraphQL backend.
//!
//! The wire contract is the dashboard backend's schema:
//!
//! - `requestNonce(address: String!) -> String` — single-use challenge
//! - `login(loginInput: { address, signature, nonce }) -> { token }`
//! - `verifyToken(token: String!) -> Boolean`
//!
//! Only an explicit `false` from `verifyToken` means the token is invalid;
//! transport failures stay transport failures so a flaky network never
//! destroys a valid session.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use crate::client::GraphqlClient;
use crate::error::{ExchangeError, TransportError};

/// A single-use challenge issued for one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nonce {
    pub value: String,
    pub address: String,
    pub issued_at: DateTime<Utc>,
}

/// Requests a single-use nonce for an address.
#[async_trait]
pub trait ChallengeApi: Send + Sync + 'static {
    async fn request_nonce(&self, address: &str) -> Result<Nonce, TransportError>;
}

/// Exchanges a signed nonce for a session token and verifies existing tokens.
#[async_trait]
pub trait AuthApi: Send + Sync + 'static {
    /// Exchange `{address, signature, nonce}` for a session token.
    async fn exchange_token(
        &self,
        address: &str,
        signature: &str,
        nonce: &str,
    ) -> Result<String, ExchangeError>;

    /// Check whether `token` is still accepted by the server.
    ///
    /// `Ok(false)` is an explicit rejection; `Err(_)` means the server was
    /// unreachable and nothing can be concluded about the token.
    async fn verify_token(&self, token: &str) -> Result<bool, TransportError>;
}

const REQUEST_NONCE: &str =
    "query GetNonce($address: String!) { requestNonce(address: $address) }";

const LOGIN: &str =
    "mutation Login($loginInput: LoginInput!) { login(loginInput: $loginInput) { token } }";

const VERIFY_TOKEN: &str = "query VerifyToken($token: String!) { verifyToken(token: $token) }";

/// GraphQL-backed [`ChallengeApi`].
#[derive(Debug)]
pub struct GraphqlChallengeClient {
    client: Arc<GraphqlClient>,
}

impl GraphqlChallengeClient {
    pub fn new(client: Arc<GraphqlClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChallengeApi for GraphqlChallengeClient {
    async fn request_nonce(&self, address: &str) -> Result<Nonce, TransportError> {
        let data = self
            .client
            .execute(REQUEST_NONCE, json!({ "address": address }))
            .await?;
        let value = parse_nonce_data(&data)?;
        Ok(Nonce {
            value,
            address: address.to_string(),
            issued_at: Utc::now(),
        })
    }
}

/// GraphQL-backed [`AuthApi`].
#[derive(Debug)]
pub struct GraphqlAuthClient {
    client: Arc<GraphqlClient>,
}

impl GraphqlAuthClient {
    pub fn new(client: Arc<GraphqlClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AuthApi for GraphqlAuthClient {
    async fn exchange_token(
        &self,
        address: &str,
        signature: &str,
        nonce: &str,
    ) -> Result<String, ExchangeError> {
        let variables = json!({
            "loginInput": {
                "address": address,
                "signature": signature,
                "nonce": nonce,
            }
        });
        let data = match self.client.execute(LOGIN, variables).await {
            Ok(data) => data,
            // A GraphQL-level error means the server evaluated and rejected
            // the signed payload; everything else is transport.
            Err(TransportError::Graphql { message }) => {
                return Err(ExchangeError::InvalidSignature { reason: message });
            }
            Err(other) => return Err(ExchangeError::Transport(other)),
        };
        parse_login_data(&data)
    }

    async fn verify_token(&self, token: &str) -> Result<bool, TransportError> {
        let data = self
            .client
            .execute(VERIFY_TOKEN, json!({ "token": token }))
            .await?;
        Ok(parse_verify_data(&data))
    }
}

fn parse_nonce_data(data: &Value) -> Result<String, TransportError> {
    data.get("requestNonce")
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| TransportError::MalformedResponse {
            field: "requestNonce".to_string(),
        })
}

fn parse_login_data(data: &Value) -> Result<String, ExchangeError> {
    match data
        .get("login")
        .and_then(|login| login.get("token"))
        .and_then(Value::as_str)
    {
        Some(token) if !token.is_empty() => Ok(token.to_string()),
        // The server answered without a token: a rejection, not a glitch.
        _ => Err(ExchangeError::Server {
            reason: "login response carried no token".to_string(),
        }),
    }
}

fn parse_verify_data(data: &Value) -> bool {
    match data.get("verifyToken") {
        Some(Value::Bool(valid)) => *valid,
        Some(Value::Null) | None => false,
        // Some backends answer with the decoded claims instead of a boolean;
        // any non-null payload counts as valid.
        Some(_) => true,
    }
}
