//! Bootstrap Retry Policy
//!
//! Every pipeline dependency (message log, tick store) is retried at startup
//! until it becomes reachable. The default policy waits a fixed 2s between
//! attempts with no attempt limit; multiplier, cap, jitter and attempt limit
//! are configurable for deployments that want to fail fast instead.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::application::services::status::ComponentState;
use crate::infrastructure::metrics;

/// Retry timing.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth factor between retries (1.0 = fixed delay).
    pub multiplier: f64,
    /// Randomization as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
    /// Maximum retries (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_delay: Duration::from_secs(30),
            ..Self::fixed(Duration::from_secs(2))
        }
    }
}

impl RetryConfig {
    /// Fixed delay, unlimited attempts.
    #[must_use]
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            jitter_factor: 0.0,
            max_attempts: 0,
        }
    }

    /// True when the policy never gives up.
    #[must_use]
    pub const fn is_unlimited(&self) -> bool {
        self.max_attempts == 0
    }
}

/// Stateful retry schedule.
#[derive(Debug)]
pub struct RetryPolicy {
    config: RetryConfig,
    attempts: u32,
}

impl RetryPolicy {
    /// Create a policy with no attempts made.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Delay before the next retry, or `None` once the attempt limit is hit.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }
        let base = self.base_delay(self.attempts);
        self.attempts += 1;
        Some(self.apply_jitter(base))
    }

    /// Forget previous attempts.
    pub const fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Retries handed out so far.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempts
    }

    /// Whether another retry is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempts < self.config.max_attempts
    }

    /// `initial * multiplier^attempt`, capped at `max_delay`.
    fn base_delay(&self, attempt: u32) -> Duration {
        let initial = self.config.initial_delay.as_secs_f64();
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = initial * self.config.multiplier.powi(exponent);
        let cap = self.config.max_delay.as_secs_f64().max(initial);
        if scaled.is_finite() && scaled >= 0.0 {
            Duration::from_secs_f64(scaled.min(cap))
        } else {
            Duration::from_secs_f64(cap)
        }
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return delay;
        }
        let secs = delay.as_secs_f64();
        let spread = secs * self.config.jitter_factor;
        let offset: f64 = rand::rng().random_range(-spread..=spread);
        Duration::from_secs_f64((secs + offset).max(0.001))
    }
}

/// Bootstrap failures.
#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    /// Attempt limit reached without the dependency becoming ready.
    #[error("{dependency} not ready after {attempts} retries: {last_error}")]
    Exhausted {
        /// Dependency being waited on.
        dependency: String,
        /// Retries made.
        attempts: u32,
        /// Error from the final attempt.
        last_error: String,
    },

    /// Shutdown requested while waiting.
    #[error("cancelled while waiting for {0}")]
    Cancelled(String),
}

/// Run `attempt` until it succeeds, sleeping per `policy` between failures.
///
/// Each failure is logged, counted against `state` and the bootstrap retry
/// metric. Cancellation interrupts the wait.
///
/// # Errors
///
/// Returns `RetryError::Exhausted` when the policy runs out of attempts and
/// `RetryError::Cancelled` when `cancel` fires first.
pub async fn wait_until_ready<T, E, F, Fut>(
    dependency: &str,
    policy: &mut RetryPolicy,
    state: &ComponentState,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Result<T, RetryError>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    loop {
        let err = tokio::select! {
            () = cancel.cancelled() => return Err(RetryError::Cancelled(dependency.to_string())),
            result = attempt() => match result {
                Ok(value) => {
                    if policy.attempt_count() > 0 {
                        tracing::info!(
                            dependency,
                            attempts = policy.attempt_count(),
                            "Dependency became ready"
                        );
                    }
                    policy.reset();
                    return Ok(value);
                }
                Err(e) => e.to_string(),
            },
        };

        state.record_retry(err.clone());
        metrics::record_bootstrap_retry(dependency);

        let Some(delay) = policy.next_delay() else {
            return Err(RetryError::Exhausted {
                dependency: dependency.to_string(),
                attempts: policy.attempt_count(),
                last_error: err,
            });
        };

        tracing::warn!(
            dependency,
            attempt = policy.attempt_count(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "Dependency unavailable, retrying"
        );

        tokio::select! {
            () = cancel.cancelled() => return Err(RetryError::Cancelled(dependency.to_string())),
            () = tokio::time::sleep(delay) => {}
        }
    }
}
