//! Named retry policies.
//!
//! Every component owns its own [`RetryPolicy`] (attempt budget + backoff
//! shape) and the caller applies it, so budgets are visible at the call site
//! and never shared across operation classes.

use anyhow::{Context, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Shape of the pause between two attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// `initial * multiplier^(n-1)`, capped at `max`. No jitter.
    Exponential {
        initial: Duration,
        max: Duration,
        multiplier: f64,
    },
    /// Uniformly random in `[min, max]`.
    Uniform { min: Duration, max: Duration },
    Fixed(Duration),
}

impl Backoff {
    /// Pause after the `failed_attempt`-th failure (1-based).
    pub fn delay(&self, failed_attempt: u32) -> Duration {
        match *self {
            Backoff::Exponential {
                initial,
                max,
                multiplier,
            } => {
                let exp = failed_attempt.saturating_sub(1) as i32;
                let secs = initial.as_secs_f64() * multiplier.powi(exp);
                Duration::from_secs_f64(secs.min(max.as_secs_f64()))
            }
            Backoff::Uniform { min, max } => random_between(min, max),
            Backoff::Fixed(d) => d,
        }
    }
}

/// Uniform random duration in `[min, max]` (millisecond resolution).
pub fn random_between(min: Duration, max: Duration) -> Duration {
    let (lo, hi) = (min.as_millis() as u64, max.as_millis() as u64);
    if hi <= lo {
        return min;
    }
    Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub name: &'static str,
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub const fn new(name: &'static str, max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            name,
            max_attempts,
            backoff,
        }
    }

    /// Whole wallet pipeline: 3 attempts, 30-60s apart.
    pub const fn wallet_pipeline() -> Self {
        Self::new(
            "wallet_pipeline",
            3,
            Backoff::Uniform {
                min: Duration::from_secs(30),
                max: Duration::from_secs(60),
            },
        )
    }

    /// Faucet claim: 3 attempts, exponential from 4s capped at 10s.
    pub const fn faucet_claim() -> Self {
        Self::new(
            "faucet_claim",
            3,
            Backoff::Exponential {
                initial: Duration::from_secs(4),
                max: Duration::from_secs(10),
                multiplier: 2.0,
            },
        )
    }

    /// A single on-chain create/redeem: 3 attempts, 10-20s apart.
    pub const fn chain_operation() -> Self {
        Self::new(
            "chain_operation",
            3,
            Backoff::Uniform {
                min: Duration::from_secs(10),
                max: Duration::from_secs(20),
            },
        )
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn start(&self) -> RetryState {
        RetryState {
            policy: *self,
            attempt: 0,
        }
    }
}

/// Attempt counter for one run of a policy. Never exceeds `max_attempts`.
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    attempt: u32,
}

impl RetryState {
    /// Starts the next attempt, returning its 1-based number, or `None`
    /// once the budget is spent.
    pub fn begin(&mut self) -> Option<u32> {
        if self.attempt >= self.policy.max_attempts {
            return None;
        }
        self.attempt += 1;
        Some(self.attempt)
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts
    }

    pub fn has_remaining(&self) -> bool {
        self.attempt < self.policy.max_attempts
    }

    /// Pause to apply after the current attempt failed, `None` when it was the last.
    pub fn backoff(&self) -> Option<Duration> {
        self.has_remaining()
            .then(|| self.policy.backoff.delay(self.attempt))
    }
}

/// Runs `operation` until it succeeds or the policy's budget is spent.
/// The closure receives the 1-based attempt number. `label` prefixes every
/// retry line so callers can say whose work is being retried.
pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut state = policy.start();
    let mut last_error = None;

    while let Some(attempt) = state.begin() {
        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    debug!("{} {} succeeded on attempt {}", label, policy.name, attempt);
                }
                return Ok(result);
            }
            Err(e) => {
                match state.backoff() {
                    Some(delay) => {
                        warn!(
                            "{} {} failed (attempt {}/{}). Retrying in {:.1}s: {:#}",
                            label,
                            policy.name,
                            attempt,
                            policy.max_attempts,
                            delay.as_secs_f64(),
                            e
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => debug!("{} {} failed on final attempt {}", label, policy.name, attempt),
                }
                last_error = Some(e);
            }
        }
    }

    let attempts = state.attempt();
    match last_error {
        Some(e) => Err(e).context(format!(
            "{} failed after {} attempts",
            policy.name, attempts
        )),
        None => Err(anyhow::anyhow!("{} has a zero attempt budget", policy.name)),
    }
}
