//! Error types for walletgate.

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Signer error: {0}")]
    Sign(#[from] SignError),

    #[error("Token exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Session persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Network-level failures talking to the GraphQL backend.
///
/// Every variant is transient from the session engine's point of view: no
/// stored session is destroyed because of a transport failure.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("GraphQL error: {message}")]
    Graphql { message: String },

    #[error("Malformed response: missing {field}")]
    MalformedResponse { field: String },
}

/// Failures reported by the wallet signing capability.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignError {
    #[error("Signature request rejected by user")]
    Rejected,

    #[error("Wallet disconnected during signing")]
    Disconnected,
}

/// Failures exchanging a signed nonce for a session token.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("Signature rejected by server: {reason}")]
    InvalidSignature { reason: String },

    #[error("Server rejected login: {reason}")]
    Server { reason: String },

    #[error("Transport error during exchange: {0}")]
    Transport(#[from] TransportError),
}

/// Wallet address and signature encoding errors.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("Invalid wallet address: {value}")]
    InvalidAddress { value: String },

    #[error("Invalid signature encoding: {reason}")]
    InvalidSignatureEncoding { reason: String },

    #[error("Invalid signing key: {reason}")]
    InvalidKey { reason: String },

    #[error("Failed recovering signer: {reason}")]
    Recovery { reason: String },
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
