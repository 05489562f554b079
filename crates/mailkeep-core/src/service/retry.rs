//! Bounded exponential backoff.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::{Error, Result};

/// How often and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Factor applied to the delay after each further failure.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that tries exactly once.
    #[must_use]
    pub const fn once() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }
}

/// Runs `operation` until it succeeds or the policy is exhausted.
///
/// Waits between attempts without blocking other tasks; there is no wait
/// after the last attempt.
///
/// # Errors
///
/// Returns `ServerNotResponding` once every attempt has failed. The last
/// underlying error is logged, not returned.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Display,
{
    let mut delay = policy.initial_delay;

    for attempt in 1..=policy.max_attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt == policy.max_attempts => {
                warn!(attempt, "Giving up: {e}");
            }
            Err(e) => {
                debug!(attempt, ?delay, "Attempt failed, retrying: {e}");
                tokio::time::sleep(delay).await;
                delay = delay.mul_f64(policy.multiplier);
            }
        }
    }

    Err(Error::ServerNotResponding)
}
