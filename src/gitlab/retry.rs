//! Bounded exponential backoff for outbound GitLab calls
//!
//! Each logical call gets its own attempt counter; nothing is shared between
//! calls. Failures are classified through [`GitlabError::http_status`]:
//! 429 and 5xx are transient, everything else is returned on the first attempt.
//! Credential errors are never retried, whatever status the token endpoint gave.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use super::errors::{GitlabError, GitlabResult};

/// Default number of attempts per call, first try included
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Which failures a policy treats as retryable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOn {
    /// 429 and every 5xx status
    Transient,
    /// Only 429, where GitLab refused the request before doing any work
    RateLimitOnly,
}

/// Backoff configuration for one class of calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter_ratio: f64,
    retry_on: RetryOn,
}

/// Bookkeeping for the attempt that just failed
#[derive(Debug, Clone, Copy)]
struct RetryAttempt {
    attempt: u32,
    status: Option<u16>,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::reads(DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryPolicy {
    /// Policy for idempotent reads: retries 429 and 5xx
    pub fn reads(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_millis(2000),
            jitter_ratio: 0.2,
            retry_on: RetryOn::Transient,
        }
    }

    /// Policy for non-idempotent writes: a 5xx may mean the write happened, so only 429 is retried
    pub fn writes(max_attempts: u32) -> Self {
        Self {
            retry_on: RetryOn::RateLimitOnly,
            ..Self::reads(max_attempts)
        }
    }

    /// Overrides the backoff base and cap
    pub fn with_delays(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Un-jittered delay after the given failed attempt (1-based)
    ///
    /// `min(max_delay, base_delay * 2^(attempt-1))`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Whether the failure of `attempt` should lead to another try
    pub fn should_retry(&self, err: &GitlabError, attempt: u32) -> bool {
        // A credential failure already went through its own single-flight refresh.
        if attempt >= self.max_attempts || matches!(err, GitlabError::Auth(_)) {
            return false;
        }
        match (self.retry_on, err.http_status()) {
            (RetryOn::Transient, Some(status)) => super::errors::is_retryable_status(status),
            (RetryOn::RateLimitOnly, Some(status)) => status == 429,
            (_, None) => false,
        }
    }

    /// Runs `call` until it succeeds, fails terminally, or attempts run out
    pub async fn execute<T, F, Fut>(&self, mut call: F) -> GitlabResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GitlabResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if self.should_retry(&err, attempt) => {
                    let state = RetryAttempt {
                        attempt,
                        status: err.http_status(),
                        delay: jitter(self.backoff_delay(attempt), self.jitter_ratio),
                    };
                    debug!(
                        attempt = state.attempt,
                        status = ?state.status,
                        delay_ms = state.delay.as_millis() as u64,
                        "GitLab request failed; retrying"
                    );
                    tokio::time::sleep(state.delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Spreads `delay` uniformly over `[delay - r*delay, delay + r*delay]`
fn jitter(delay: Duration, ratio: f64) -> Duration {
    let millis = delay.as_millis() as u64;
    let delta = (millis as f64 * ratio).floor() as u64;
    if delta == 0 {
        return delay;
    }
    let offset = rand::thread_rng().gen_range(0..=delta * 2);
    Duration::from_millis(millis - delta + offset)
}
