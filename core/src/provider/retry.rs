//! Bounded retries with exponential backoff.
//!
//! The policy only decides *whether* and *how long*; waiting goes through a
//! [`Sleeper`] so the schedule can be checked without a real clock.

use log::warn;
use reqwest::StatusCode;
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry; doubled for every retry after it.
    pub base_delay: Duration,
    /// Upper bound for any delay, including server supplied ones.
    pub max_delay: Duration,
    /// Calls made in total, the first one included.
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub const fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts,
        }
    }

    /// How long to wait after `attempt` (1-based) failed with `failure`, or
    /// `None` when the caller should give up.
    pub fn next_delay(&self, failure: Failure, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let retry_after = match failure {
            Failure::Permanent => return None,
            Failure::Status { status, .. } if !is_transient_status(status) => return None,
            Failure::Status { retry_after, .. } | Failure::Network { retry_after } => retry_after,
        };
        let delay = retry_after.unwrap_or_else(|| self.backoff(attempt - 1));
        Some(delay.min(self.max_delay))
    }

    fn backoff(&self, retries_so_far: u32) -> Duration {
        let factor = 1u32.checked_shl(retries_so_far).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30), 3)
    }
}

/// How a failed call should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// The server answered with a non-success status.
    Status {
        status: StatusCode,
        retry_after: Option<Duration>,
    },
    /// No response at all (connection refused, timeout, reset).
    Network { retry_after: Option<Duration> },
    /// Retrying cannot help.
    Permanent,
}

pub trait Retryable {
    fn failure(&self) -> Failure;
}

/// 408, 429 and every 5xx.
pub fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

/// `Retry-After` as delta seconds or an HTTP date. Dates in the past mean
/// "now".
pub fn parse_retry_after(value: &str, now: SystemTime) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = httpdate::parse_http_date(value).ok()?;
    Some(at.duration_since(now).unwrap_or_default())
}

pub trait Sleeper: Send + Sync {
    fn sleep(&self, delay: Duration) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Calls `operation` until it succeeds or `policy` gives up, returning the
/// last error in the latter case. `operation` receives the 1-based attempt.
pub async fn retry_with_policy<T, E, S, F, Fut>(
    policy: RetryPolicy,
    sleeper: &S,
    mut operation: F,
) -> Result<T, E>
where
    E: Retryable + Display,
    S: Sleeper,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        let error = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        let Some(delay) = policy.next_delay(error.failure(), attempt) else {
            return Err(error);
        };
        warn!(
            "attempt {attempt}/{} failed: {error}; retrying in {}ms",
            policy.max_attempts,
            delay.as_millis()
        );
        sleeper.sleep(delay).await;
        attempt += 1;
    }
}
