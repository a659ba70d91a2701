//! Retry policies.
//!
//! A policy is consulted after every failed attempt with the error and the
//! 0-based attempt number (the first try counts). It answers with a delay
//! or gives up; scheduling the delay is the orchestrator's job and never
//! blocks a thread.

use rand::Rng;
use std::time::Duration;

use crate::errors::AwsError;

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_RETRIES: u32 = 4;

/// Decides whether and when to re-attempt a failed exchange.
pub trait RetryPolicy: Send + Sync + 'static {
    /// Delay before the next attempt, or `None` to give up.
    fn retry_wait_time(&self, error: &AwsError, attempt: u32) -> Option<Duration>;
}

/// Never retries.
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn retry_wait_time(&self, _error: &AwsError, _attempt: u32) -> Option<Duration> {
        None
    }
}

/// Plain exponential backoff: `base * 2^attempt`.
pub struct ExponentialRetry {
    base: Duration,
    max_retries: u32,
}

impl ExponentialRetry {
    pub fn new(base: Duration, max_retries: u32) -> Self {
        Self { base, max_retries }
    }
}

impl Default for ExponentialRetry {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES)
    }
}

impl RetryPolicy for ExponentialRetry {
    fn retry_wait_time(&self, error: &AwsError, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries || !error.is_retriable() {
            return None;
        }
        Some(exponential_delay(self.base, attempt))
    }
}

/// Exponential backoff with full-range jitter:
/// `uniform(base * 2^attempt / 2, base * 2^attempt)`. The default policy.
pub struct JitterRetry {
    base: Duration,
    max_retries: u32,
}

impl JitterRetry {
    pub fn new(base: Duration, max_retries: u32) -> Self {
        Self { base, max_retries }
    }
}

impl Default for JitterRetry {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES)
    }
}

impl RetryPolicy for JitterRetry {
    fn retry_wait_time(&self, error: &AwsError, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries || !error.is_retriable() {
            return None;
        }
        let full = exponential_delay(self.base, attempt).as_millis() as u64;
        let half = full / 2;
        let millis = if half == full {
            full
        } else {
            rand::thread_rng().gen_range(half..full)
        };
        Some(Duration::from_millis(millis))
    }
}

fn exponential_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ServiceError;

    fn service_unavailable() -> AwsError {
        AwsError::Service(ServiceError::Server {
            code: "ServiceUnavailable".into(),
            message: "".into(),
            status: 503,
        })
    }

    fn bad_request() -> AwsError {
        AwsError::Service(ServiceError::Response {
            code: "ValidationError".into(),
            message: "".into(),
            status: 400,
        })
    }

    #[test]
    fn test_no_retry_never_retries() {
        assert!(NoRetry.retry_wait_time(&service_unavailable(), 0).is_none());
    }

    #[test]
    fn test_exponential_delays_double() {
        let policy = ExponentialRetry::new(Duration::from_secs(1), 4);
        let err = service_unavailable();
        assert_eq!(policy.retry_wait_time(&err, 0), Some(Duration::from_secs(1)));
        assert_eq!(policy.retry_wait_time(&err, 1), Some(Duration::from_secs(2)));
        assert_eq!(policy.retry_wait_time(&err, 2), Some(Duration::from_secs(4)));
        assert_eq!(policy.retry_wait_time(&err, 3), Some(Duration::from_secs(8)));
        // max_retries attempts: the fifth attempt is never scheduled.
        assert_eq!(policy.retry_wait_time(&err, 4), None);
    }

    #[test]
    fn test_bad_request_is_never_retried() {
        let policy = JitterRetry::default();
        assert!(policy.retry_wait_time(&bad_request(), 0).is_none());
        let exponential = ExponentialRetry::default();
        assert!(exponential.retry_wait_time(&bad_request(), 0).is_none());
    }

    #[test]
    fn test_jitter_delay_bounds() {
        let policy = JitterRetry::new(Duration::from_secs(1), 4);
        let err = service_unavailable();
        for attempt in 0..4u32 {
            let full = 1000u64 << attempt;
            for _ in 0..50 {
                let delay = policy.retry_wait_time(&err, attempt).unwrap();
                let millis = delay.as_millis() as u64;
                assert!(millis >= full / 2, "delay {millis} below half window");
                assert!(millis < full, "delay {millis} at or above full window");
            }
        }
    }

    #[test]
    fn test_transport_timeout_is_retriable() {
        let policy = JitterRetry::default();
        let err = AwsError::Transport(crate::errors::TransportError::Timeout(
            Duration::from_secs(1),
        ));
        assert!(policy.retry_wait_time(&err, 0).is_some());
    }
}
