//! Bounded retries with exponential backoff for workflow operations.

use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::AutomationError;

/// Backoff schedule for one class of operation.
///
/// The delay after the n-th failed attempt is `base_delay * 2^(n-1)`,
/// capped at `max_delay`. No jitter: a single consumer has nobody to
/// desynchronize from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// Short idempotent UI steps: three attempts.
    pub fn cheap() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2_000,
            max_delay_ms: 30_000,
        }
    }

    /// Steps that kick off long server-side work: one retry at most.
    pub fn expensive() -> Self {
        Self {
            max_attempts: 2,
            ..Self::cheap()
        }
    }

    /// Delay to wait after `attempt` (1-based) has failed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    /// Total time spent sleeping when the first `failures` attempts fail.
    pub fn total_delay(&self, failures: u32) -> Duration {
        (1..=failures.min(self.max_attempts.saturating_sub(1)))
            .map(|n| self.delay_for_attempt(n))
            .sum()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::cheap()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationCost {
    Cheap,
    Expensive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub cheap: RetryPolicy,
    pub expensive: RetryPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            cheap: RetryPolicy::cheap(),
            expensive: RetryPolicy::expensive(),
        }
    }
}

/// Runs session operations under a [`RetryPolicy`].
///
/// Only [`AutomationError::WorkflowStep`] failures are retried; anything
/// else is returned on the spot. When attempts run out the last error is
/// wrapped in [`AutomationError::RetriesExhausted`].
#[derive(Debug, Clone, Default)]
pub struct RetrySupervisor {
    config: RetryConfig,
}

impl RetrySupervisor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn policy(&self, cost: OperationCost) -> &RetryPolicy {
        match cost {
            OperationCost::Cheap => &self.config.cheap,
            OperationCost::Expensive => &self.config.expensive,
        }
    }

    /// Runs `op` against `session` until it succeeds, fails fatally, or the
    /// policy for `cost` runs out of attempts.
    pub async fn run<S, T, F>(
        &self,
        session: &mut S,
        operation: &'static str,
        cost: OperationCost,
        mut op: F,
    ) -> Result<T, AutomationError>
    where
        S: ?Sized + Send,
        F: for<'s> FnMut(&'s mut S) -> BoxFuture<'s, Result<T, AutomationError>>,
    {
        let policy = self.policy(cost);
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!(operation, attempt, max_attempts, "Attempting operation");

            let err = match op(&mut *session).await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => err,
            };

            if attempt >= max_attempts {
                warn!(operation, attempts = attempt, error = %err, "Giving up");
                return Err(AutomationError::RetriesExhausted {
                    operation,
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            let delay = policy.delay_for_attempt(attempt);
            warn!(
                operation,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Operation failed, retrying"
            );
            sleep(delay).await;
        }
    }
}
