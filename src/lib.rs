//! Wallet challenge-response session engine.
//!
//! `walletgate` owns the authentication lifecycle of a wallet-connected
//! dashboard: acquire a single-use nonce for the connected address, obtain
//! a signature from the wallet, exchange `{address, signature, nonce}` for
//! a session token over GraphQL, persist the token durably, and revalidate
//! it on later connections. Wallet connect/disconnect events drive a
//! [`SessionEngine`]; everything downstream reads the resulting state
//! through an [`AuthContext`] or the engine's transition stream.
//!
//! The wallet itself and the server-side nonce/verification endpoints are
//! external collaborators, reached through the [`WalletSigner`],
//! [`ChallengeApi`], and [`AuthApi`] seams.

pub mod client;
pub mod config;
pub mod error;
pub mod session;
pub mod signer;
pub mod wallet;

pub use client::auth::{
    AuthApi, ChallengeApi, GraphqlAuthClient, GraphqlChallengeClient, Nonce,
};
pub use client::{GraphqlClient, TokenCell};
pub use config::Config;
pub use error::{
    ConfigError, Error, ExchangeError, Result, SignError, StoreError, TransportError, WalletError,
};
pub use session::machine::{AuthContext, FailureReason, SessionEngine, SessionPhase};
pub use session::retry::{RetryBudget, RetryCoordinator, RetryOutcome};
pub use session::store::{SESSION_TTL_DAYS, Session, SessionStore};
pub use signer::{LocalSigner, WalletSigner};
