//! Bounded retry with exponential backoff and random jitter

use std::time::Duration;

use rand::Rng;

use crate::error::FetchError;

/// How a failed attempt should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Server asked us to slow down; wait and try again
    RetryableRateLimit,
    /// Anything else; surface immediately
    Fatal,
}

/// Only rate limiting is worth another attempt.
pub fn classify(err: &FetchError) -> RetryOutcome {
    if err.is_rate_limited() {
        RetryOutcome::RetryableRateLimit
    } else {
        RetryOutcome::Fatal
    }
}

/// Retry budget for one unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Upper bound of the exponential part of a wait
    pub max_wait: Duration,
    /// Upper bound of the uniform random part of a wait
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            max_wait: Duration::from_secs(240),
            max_jitter: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Full wait before the attempt following `attempt` (1-based).
    pub fn wait_after(&self, attempt: u32) -> Duration {
        backoff_duration(attempt, self.max_wait) + jitter(self.max_jitter)
    }
}

/// Exponential backoff: 2^attempt milliseconds, capped at `max_wait`
pub fn backoff_duration(attempt: u32, max_wait: Duration) -> Duration {
    let millis = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(millis).min(max_wait)
}

fn jitter(max_jitter: Duration) -> Duration {
    let max = max_jitter.as_millis() as u64;
    if max == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max))
}

/// Retry a fallible operation while it reports rate limiting.
///
/// `sleep` is called between attempts with the computed wait; production
/// callers pass [`std::thread::sleep`]. Fatal errors are returned as-is,
/// an exhausted budget becomes [`FetchError::RetriesExhausted`] naming `label`.
pub fn retry_with_backoff<T>(
    label: &str,
    policy: &RetryPolicy,
    mut sleep: impl FnMut(Duration),
    mut attempt_fn: impl FnMut() -> Result<T, FetchError>,
) -> Result<T, FetchError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let err = match attempt_fn() {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };
        match classify(&err) {
            RetryOutcome::Fatal => {
                log::error!("{label}: failed permanently: {err}");
                return Err(err);
            }
            RetryOutcome::RetryableRateLimit if attempt >= max_attempts => {
                log::error!("{label}: still rate limited after {attempt} attempts");
                return Err(FetchError::RetriesExhausted {
                    label: label.to_string(),
                    attempts: attempt,
                });
            }
            RetryOutcome::RetryableRateLimit => {
                let wait = policy.wait_after(attempt);
                log::warn!("{label}: rate limited, retry {attempt}/{max_attempts} in {wait:?}");
                sleep(wait);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            max_wait: Duration::from_secs(240),
            max_jitter: Duration::from_millis(100),
        }
    }

    #[test]
    fn backoff_exponential() {
        let cap = Duration::from_secs(240);
        assert_eq!(backoff_duration(1, cap), Duration::from_millis(2));
        assert_eq!(backoff_duration(2, cap), Duration::from_millis(4));
        assert_eq!(backoff_duration(3, cap), Duration::from_millis(8));
    }

    #[test]
    fn backoff_capped() {
        let cap = Duration::from_secs(1);
        assert_eq!(backoff_duration(20, cap), cap);
        assert_eq!(backoff_duration(200, cap), cap);
    }

    #[test]
    fn wait_includes_bounded_jitter() {
        let p = policy(3);
        for _ in 0..50 {
            let wait = p.wait_after(1);
            assert!(wait >= Duration::from_millis(2));
            assert!(wait <= Duration::from_millis(102));
        }
    }

    #[test]
    fn no_jitter_when_zero() {
        let p = RetryPolicy {
            max_jitter: Duration::ZERO,
            ..policy(3)
        };
        assert_eq!(p.wait_after(3), Duration::from_millis(8));
    }

    #[test]
    fn classify_only_rate_limit_retryable() {
        assert_eq!(
            classify(&FetchError::RateLimited),
            RetryOutcome::RetryableRateLimit
        );
        assert_eq!(classify(&FetchError::http(500, "")), RetryOutcome::Fatal);
        assert_eq!(
            classify(&FetchError::Timeout("read".into())),
            RetryOutcome::Fatal
        );
    }

    #[test]
    fn rate_limited_every_time_attempts_exactly_max() {
        let mut calls = 0;
        let mut sleeps = Vec::new();
        let result: Result<(), _> = retry_with_backoff(
            "Tickets",
            &policy(3),
            |d| sleeps.push(d),
            || {
                calls += 1;
                Err(FetchError::RateLimited)
            },
        );
        assert_eq!(calls, 3);
        assert_eq!(sleeps.len(), 2);
        match result {
            Err(FetchError::RetriesExhausted { label, attempts }) => {
                assert_eq!(label, "Tickets");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn first_success_never_sleeps() {
        let mut sleeps = 0;
        let result = retry_with_backoff("Groups", &policy(3), |_| sleeps += 1, || Ok(42));
        assert_eq!(result.unwrap(), 42);
        assert_eq!(sleeps, 0);
    }

    #[test]
    fn recovers_after_rate_limit() {
        let mut calls = 0;
        let mut sleeps = 0;
        let result = retry_with_backoff(
            "Groups",
            &policy(5),
            |_| sleeps += 1,
            || {
                calls += 1;
                if calls < 3 {
                    Err(FetchError::RateLimited)
                } else {
                    Ok("page")
                }
            },
        );
        assert_eq!(result.unwrap(), "page");
        assert_eq!(calls, 3);
        assert_eq!(sleeps, 2);
    }

    #[test]
    fn fatal_error_not_retried() {
        let mut calls = 0;
        let mut sleeps = 0;
        let result: Result<(), _> = retry_with_backoff(
            "Groups",
            &policy(5),
            |_| sleeps += 1,
            || {
                calls += 1;
                Err(FetchError::http(404, "missing"))
            },
        );
        assert_eq!(calls, 1);
        assert_eq!(sleeps, 0);
        assert!(matches!(
            result,
            Err(FetchError::Http { status: 404, .. })
        ));
    }

    #[test]
    fn zero_budget_still_attempts_once() {
        let mut calls = 0;
        let result: Result<(), _> = retry_with_backoff(
            "Tags",
            &policy(0),
            |_| {},
            || {
                calls += 1;
                Err(FetchError::RateLimited)
            },
        );
        assert_eq!(calls, 1);
        assert!(matches!(
            result,
            Err(FetchError::RetriesExhausted { attempts: 1, .. })
        ));
    }
}
