//! Bounded, fixed-delay retry of a fallible async operation.
//!
//! One [`RetryBudget`] is scoped to a single challenge cycle and reset when
//! a new cycle starts. The delay is deliberately fixed, not exponential:
//! the operation being paced is a wallet prompt, and a user who declined
//! once is re-prompted at a steady cadence.

use std::future::Future;
use std::time::Duration;

/// Attempt accounting for one retryable operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    /// Retries consumed so far. Always `<= max_attempts`.
    pub attempts_made: u32,
    /// Retries allowed after the initial failure.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub delay: Duration,
}

impl RetryBudget {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            attempts_made: 0,
            max_attempts,
            delay,
        }
    }

    pub fn exhausted(&self) -> bool {
        self.attempts_made >= self.max_attempts
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}

/// Terminal result of a retried operation.
///
/// `Exhausted` is distinguishable from an ordinary failure: the budget ran
/// dry and the owning flow must fail terminally rather than retry again.
/// `Aborted` carries a failure classified as non-retryable.
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Succeeded(T),
    Exhausted(E),
    Aborted(E),
}

/// Drives retries of one operation against one budget.
///
/// Holds no state between calls; cancellation is handled by the caller
/// dropping or aborting the future, which abandons any pending sleep
/// without side effects.
pub struct RetryCoordinator;

impl RetryCoordinator {
    /// Invoke `op` until it succeeds, fails non-retryably, or the budget is
    /// spent.
    ///
    /// `retryable` classifies failures; `on_retry` observes each consumed
    /// attempt (called with the updated `attempts_made` after the delay,
    /// right before the re-attempt).
    pub async fn run<T, E, Op, Fut, C, R, RFut>(
        mut budget: RetryBudget,
        mut op: Op,
        retryable: C,
        mut on_retry: R,
    ) -> RetryOutcome<T, E>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> bool,
        R: FnMut(u32) -> RFut,
        RFut: Future<Output = ()>,
    {
        loop {
            match op().await {
                Ok(value) => return RetryOutcome::Succeeded(value),
                Err(err) if !retryable(&err) => return RetryOutcome::Aborted(err),
                Err(err) => {
                    if budget.exhausted() {
                        return RetryOutcome::Exhausted(err);
                    }
                    tokio::time::sleep(budget.delay).await;
                    budget.attempts_made += 1;
                    on_retry(budget.attempts_made).await;
                }
            }
        }
    }
}
