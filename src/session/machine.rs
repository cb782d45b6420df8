//! The wallet challenge-response session lifecycle.
//!
//! One [`SessionEngine`] owns the authentication state for the single
//! connected wallet address. Wallet connect/disconnect events drive it; it
//! consults the [`SessionStore`] to decide between revalidating an existing
//! token and running the challenge-response protocol, paces signature
//! retries through the [`RetryCoordinator`], and publishes every transition
//! on a watch channel for the rest of the application to observe.
//!
//! Failures are state values, not panics or errors: every dead end lands in
//! [`SessionPhase::Failed`] and waits for an external trigger.
//!
//! # Staleness discipline
//!
//! Every `connect`/`disconnect` bumps a generation counter, and each driver
//! task carries the generation it was spawned under. A transition is applied
//! only while its generation is current, so responses that arrive after a
//! disconnect or an address switch are discarded instead of corrupting the
//! state derived for the new connection.

use std::sync::Arc;

use secrecy::SecretString;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

use crate::client::TokenCell;
use crate::client::auth::{AuthApi, ChallengeApi};
use crate::error::{SignError, StoreError, WalletError};
use crate::session::retry::{RetryBudget, RetryCoordinator, RetryOutcome};
use crate::session::store::{Session, SessionStore};
use crate::signer::WalletSigner;
use crate::wallet;

/// Why a cycle ended in [`SessionPhase::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The nonce request failed; nothing was signed.
    NonceUnavailable,
    /// The signature retry budget ran dry.
    SignatureExhausted,
    /// The server rejected the signed exchange.
    ExchangeRejected,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NonceUnavailable => "nonce-unavailable",
            Self::SignatureExhausted => "signature-exhausted",
            Self::ExchangeRejected => "exchange-rejected",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current position in the authentication lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// No wallet connected. Initial state.
    Disconnected,
    /// A stored session exists for the connected address; verification is in
    /// flight.
    ValidatingToken { address: String },
    /// No trusted session; a nonce request is in flight.
    AwaitingNonce { address: String },
    /// Nonce obtained; a signing request is in flight.
    AwaitingSignature { address: String, attempts_made: u32 },
    /// Signature obtained; exchanging it for a session token.
    ExchangingToken { address: String },
    /// A confirmed session exists. Stable until disconnect or invalidation.
    Authenticated { address: String },
    /// The cycle ended; an explicit restart trigger is required to leave.
    Failed {
        address: String,
        reason: FailureReason,
    },
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::ValidatingToken { .. } => "validating_token",
            Self::AwaitingNonce { .. } => "awaiting_nonce",
            Self::AwaitingSignature { .. } => "awaiting_signature",
            Self::ExchangingToken { .. } => "exchanging_token",
            Self::Authenticated { .. } => "authenticated",
            Self::Failed { .. } => "failed",
        }
    }

    /// The wallet address this phase concerns, if any.
    pub fn address(&self) -> Option<&str> {
        match self {
            Self::Disconnected => None,
            Self::ValidatingToken { address }
            | Self::AwaitingNonce { address }
            | Self::AwaitingSignature { address, .. }
            | Self::ExchangingToken { address }
            | Self::Authenticated { address }
            | Self::Failed { address, .. } => Some(address),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    /// True for phases that persist until an external trigger.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            Self::Disconnected | Self::Authenticated { .. } | Self::Failed { .. }
        )
    }
}

struct EngineState {
    generation: u64,
    phase: SessionPhase,
    driver: Option<JoinHandle<()>>,
    /// True while a driver task may still apply transitions for the current
    /// generation. Used to suppress duplicate `connect` calls.
    in_flight: bool,
}

struct Inner {
    challenge: Arc<dyn ChallengeApi>,
    auth: Arc<dyn AuthApi>,
    signer: Arc<dyn WalletSigner>,
    store: Arc<SessionStore>,
    token: Arc<TokenCell>,
    retry: RetryBudget,
    state: Mutex<EngineState>,
    phase_tx: watch::Sender<SessionPhase>,
}

/// Orchestrates store, retry, challenge, signer, and auth adapters into one
/// authentication lifecycle.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct SessionEngine {
    inner: Arc<Inner>,
}

impl SessionEngine {
    pub fn new(
        challenge: Arc<dyn ChallengeApi>,
        auth: Arc<dyn AuthApi>,
        signer: Arc<dyn WalletSigner>,
        store: Arc<SessionStore>,
        token: Arc<TokenCell>,
        retry: RetryBudget,
    ) -> Self {
        let (phase_tx, _) = watch::channel(SessionPhase::Disconnected);
        Self {
            inner: Arc::new(Inner {
                challenge,
                auth,
                signer,
                store,
                token,
                retry,
                state: Mutex::new(EngineState {
                    generation: 0,
                    phase: SessionPhase::Disconnected,
                    driver: None,
                    in_flight: false,
                }),
                phase_tx,
            }),
        }
    }

    /// Handle a wallet connection (or reconnection, or address switch).
    ///
    /// Idempotent while a flow for the same address is in flight: the
    /// duplicate call is suppressed, not queued, so re-renders and repeated
    /// connection events never consume a second nonce. From `Failed` this is
    /// the explicit restart trigger; with a different address it supersedes
    /// the previous connection entirely.
    pub async fn connect(&self, address: &str) -> Result<(), WalletError> {
        let address = wallet::normalize_address(address)?;
        let inner = &self.inner;
        let mut state = inner.state.lock().await;

        if state.in_flight && state.phase.address() == Some(address.as_str()) {
            debug!(%address, "connect suppressed: flow already in flight");
            return Ok(());
        }

        state.generation += 1;
        let generation = state.generation;
        if let Some(driver) = state.driver.take() {
            driver.abort();
        }

        // A stored session only counts for the address that is connecting;
        // one left behind by a different address is cleared before anything
        // else is evaluated.
        let stored = match inner.store.load().await {
            Some(session) if session.address == address => Some(session),
            Some(session) => {
                info!(
                    stored = %session.address,
                    connecting = %address,
                    "clearing session persisted for a different address"
                );
                if let Err(err) = inner.store.clear().await {
                    warn!(error = %err, "failed clearing superseded session");
                }
                inner.token.clear().await;
                None
            }
            None => None,
        };

        let initial = match &stored {
            Some(_) => SessionPhase::ValidatingToken {
                address: address.clone(),
            },
            None => SessionPhase::AwaitingNonce {
                address: address.clone(),
            },
        };
        state.in_flight = true;
        inner.apply_phase_locked(&mut state, initial);

        let task = Arc::clone(inner);
        state.driver = Some(tokio::spawn(async move {
            task.drive(generation, address, stored).await;
        }));
        Ok(())
    }

    /// Handle a wallet disconnection.
    ///
    /// In-flight requests are cancelled; their eventual resolutions are
    /// discarded by the generation check. The stored session is kept — only
    /// invalidation or logout destroys it — but the in-memory token is
    /// dropped so no request goes out under a disconnected wallet.
    pub async fn disconnect(&self) {
        let inner = &self.inner;
        let mut state = inner.state.lock().await;
        state.generation += 1;
        state.in_flight = false;
        if let Some(driver) = state.driver.take() {
            driver.abort();
        }
        inner.token.clear().await;
        inner.apply_phase_locked(&mut state, SessionPhase::Disconnected);
    }

    /// Explicit logout: destroy the stored session and return to
    /// `Disconnected`.
    pub async fn logout(&self) -> Result<(), StoreError> {
        let inner = &self.inner;
        let mut state = inner.state.lock().await;
        state.generation += 1;
        state.in_flight = false;
        if let Some(driver) = state.driver.take() {
            driver.abort();
        }
        inner.store.clear().await?;
        inner.token.clear().await;
        inner.apply_phase_locked(&mut state, SessionPhase::Disconnected);
        Ok(())
    }

    /// Lazy, restartable stream of phase transitions.
    ///
    /// Each call starts a fresh stream that yields the current phase first,
    /// then every subsequent transition.
    pub fn observe(&self) -> WatchStream<SessionPhase> {
        WatchStream::new(self.inner.phase_tx.subscribe())
    }

    /// Read handle for the rest of the application.
    pub fn context(&self) -> AuthContext {
        AuthContext {
            phase: self.inner.phase_tx.subscribe(),
            token: Arc::clone(&self.inner.token),
        }
    }

    /// Current phase snapshot.
    pub async fn phase(&self) -> SessionPhase {
        self.inner.state.lock().await.phase.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.state.lock().await.phase.is_authenticated()
    }

    /// Transient copy of the persisted session for the connected address.
    ///
    /// `None` while disconnected: stored content is not trusted for gating
    /// without a connected wallet.
    pub async fn current_session(&self) -> Option<Session> {
        let address = {
            let state = self.inner.state.lock().await;
            state.phase.address()?.to_string()
        };
        self.inner
            .store
            .load()
            .await
            .filter(|session| session.address == address)
    }
}

impl std::fmt::Debug for SessionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEngine")
            .field("retry", &self.inner.retry)
            .finish_non_exhaustive()
    }
}

impl Inner {
    async fn drive(self: Arc<Self>, generation: u64, address: String, stored: Option<Session>) {
        if let Some(session) = stored {
            match self.auth.verify_token(&session.token).await {
                Ok(true) => {
                    self.complete_authenticated(generation, address, session, false)
                        .await;
                    return;
                }
                Ok(false) => {
                    info!(%address, "stored token rejected by server");
                    if !self.invalidate_stored(generation).await {
                        return;
                    }
                    if !self
                        .try_transition(
                            generation,
                            SessionPhase::AwaitingNonce {
                                address: address.clone(),
                            },
                        )
                        .await
                    {
                        return;
                    }
                }
                Err(err) => {
                    // Unreachable server says nothing about the token: keep
                    // the session and leave the retry to the caller.
                    warn!(%address, error = %err, "token verification unreachable; keeping session");
                    self.finish_flight(generation).await;
                    return;
                }
            }
        }

        self.run_challenge_cycle(generation, address).await;
    }

    async fn run_challenge_cycle(self: Arc<Self>, generation: u64, address: String) {
        let nonce = match self.challenge.request_nonce(&address).await {
            Ok(nonce) => nonce,
            Err(err) => {
                warn!(%address, error = %err, "nonce request failed");
                self.fail(generation, address, FailureReason::NonceUnavailable)
                    .await;
                return;
            }
        };
        if !self
            .try_transition(
                generation,
                SessionPhase::AwaitingSignature {
                    address: address.clone(),
                    attempts_made: 0,
                },
            )
            .await
        {
            return;
        }

        // One budget per cycle; signature retries re-sign the same nonce.
        // A declined wallet prompt consumes nothing server-side, so only a
        // new cycle requests a new nonce.
        let mut budget = self.retry;
        budget.attempts_made = 0;

        let signer = Arc::clone(&self.signer);
        let message = nonce.value.clone();
        let retry_inner = Arc::clone(&self);
        let retry_address = address.clone();
        let outcome = RetryCoordinator::run(
            budget,
            move || {
                let signer = Arc::clone(&signer);
                let message = message.clone();
                async move { signer.sign(&message).await }
            },
            |err| matches!(err, SignError::Rejected),
            move |attempts_made| {
                let inner = Arc::clone(&retry_inner);
                let address = retry_address.clone();
                async move {
                    inner
                        .try_transition(
                            generation,
                            SessionPhase::AwaitingSignature {
                                address,
                                attempts_made,
                            },
                        )
                        .await;
                }
            },
        )
        .await;

        let signature = match outcome {
            RetryOutcome::Succeeded(signature) => signature,
            RetryOutcome::Exhausted(_) => {
                info!(%address, "signature retry budget exhausted");
                self.fail(generation, address, FailureReason::SignatureExhausted)
                    .await;
                return;
            }
            RetryOutcome::Aborted(_) => {
                info!(%address, "wallet disconnected during signing");
                self.settle_disconnected(generation).await;
                return;
            }
        };

        if !self
            .try_transition(
                generation,
                SessionPhase::ExchangingToken {
                    address: address.clone(),
                },
            )
            .await
        {
            return;
        }

        match self
            .auth
            .exchange_token(&address, &signature, &nonce.value)
            .await
        {
            Ok(token) => {
                let session = Session::issued_now(address.clone(), token);
                self.complete_authenticated(generation, address, session, true)
                    .await;
            }
            Err(err) => {
                warn!(%address, error = %err, "token exchange rejected");
                self.fail(generation, address, FailureReason::ExchangeRejected)
                    .await;
            }
        }
    }

    fn apply_phase_locked(&self, state: &mut EngineState, phase: SessionPhase) {
        info!(phase = phase.as_str(), "session transition");
        state.phase = phase.clone();
        self.phase_tx.send_replace(phase);
    }

    /// Apply `phase` only while `generation` is still current.
    async fn try_transition(&self, generation: u64, phase: SessionPhase) -> bool {
        let mut state = self.state.lock().await;
        if state.generation != generation {
            debug!(phase = phase.as_str(), "discarding stale transition");
            return false;
        }
        self.apply_phase_locked(&mut state, phase);
        true
    }

    /// Persist (optionally), publish the token, and settle `Authenticated`.
    async fn complete_authenticated(
        &self,
        generation: u64,
        address: String,
        session: Session,
        persist: bool,
    ) {
        let mut state = self.state.lock().await;
        if state.generation != generation {
            debug!("discarding stale authentication result");
            return;
        }
        if persist
            && let Err(err) = self.store.save(&session).await
        {
            warn!(error = %err, "failed persisting session");
        }
        self.token.set(SecretString::from(session.token)).await;
        state.in_flight = false;
        self.apply_phase_locked(&mut state, SessionPhase::Authenticated { address });
    }

    /// Clear the persisted session and token after an explicit invalid
    /// verdict. Returns false when the result is stale.
    async fn invalidate_stored(&self, generation: u64) -> bool {
        let state = self.state.lock().await;
        if state.generation != generation {
            return false;
        }
        if let Err(err) = self.store.clear().await {
            warn!(error = %err, "failed clearing invalidated session");
        }
        self.token.clear().await;
        true
    }

    /// Settle `Failed` for the current generation.
    async fn fail(&self, generation: u64, address: String, reason: FailureReason) {
        let mut state = self.state.lock().await;
        if state.generation != generation {
            return;
        }
        state.in_flight = false;
        self.apply_phase_locked(&mut state, SessionPhase::Failed { address, reason });
    }

    /// Settle `Disconnected` after the wallet itself went away mid-flow.
    async fn settle_disconnected(&self, generation: u64) {
        let mut state = self.state.lock().await;
        if state.generation != generation {
            return;
        }
        state.generation += 1;
        state.in_flight = false;
        self.token.clear().await;
        self.apply_phase_locked(&mut state, SessionPhase::Disconnected);
    }

    /// Mark the driver finished without a terminal transition (verification
    /// network failure: the phase stays put, the session stays stored).
    async fn finish_flight(&self, generation: u64) {
        let mut state = self.state.lock().await;
        if state.generation == generation {
            state.in_flight = false;
        }
    }
}

/// Shared read handle onto the authentication state.
///
/// One writer (the engine), many readers: route guards check
/// [`AuthContext::is_authenticated`], the transport reads the bearer token,
/// and anything else can follow transitions through the phase snapshot.
#[derive(Debug, Clone)]
pub struct AuthContext {
    phase: watch::Receiver<SessionPhase>,
    token: Arc<TokenCell>,
}

impl AuthContext {
    pub fn phase(&self) -> SessionPhase {
        self.phase.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase.borrow().is_authenticated()
    }

    /// Address of the current phase, if one is connected.
    pub fn address(&self) -> Option<String> {
        self.phase.borrow().address().map(str::to_string)
    }

    /// Bearer token for outbound requests, when authenticated.
    pub async fn bearer_token(&self) -> Option<SecretString> {
        self.token.bearer().await
    }
}
