//! Bounded retry loop.
//!
//! Runs an async operation until it succeeds, fails with a non-retryable
//! error, or the attempt budget is spent. Sleeps between attempts follow
//! [`RetryPolicy::delay_for`].

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// Sleep after failed attempt `attempt` (1-based); attempt 0 never waits.
    ///
    /// Doubles from `base_delay_ms` up to `max_delay_ms`, plus up to 10% jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let Some(doublings) = attempt.checked_sub(1) else {
            return Duration::ZERO;
        };
        let ceiling = self.max_delay_ms;
        let delay = 1u64
            .checked_shl(doublings)
            .and_then(|factor| self.base_delay_ms.checked_mul(factor))
            .map_or(ceiling, |ms| ms.min(ceiling));

        let jitter = rand::thread_rng().gen_range(0..=delay / 10);
        Duration::from_millis(delay.saturating_add(jitter))
    }
}

/// Implemented by errors that know whether a retry may help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Final failure of a retried operation.
#[derive(Debug)]
pub struct RetryError<E> {
    pub attempts: u32,
    pub last_error: E,
}

/// Run `op` under `policy`. `op` receives the 1-based attempt number.
///
/// `on_retry` is called before each sleep with the attempt that failed, the
/// error and the delay about to be waited.
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    mut op: F,
    mut on_retry: R,
) -> Result<T, RetryError<E>>
where
    E: Retryable,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: FnMut(u32, &E, Duration),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt >= max_attempts || !error.is_retryable() {
                    return Err(RetryError {
                        attempts: attempt,
                        last_error: error,
                    });
                }
                let delay = policy.delay_for(attempt);
                on_retry(attempt, &error, delay);
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    struct Flaky(bool);

    impl Retryable for Flaky {
        fn is_retryable(&self) -> bool {
            self.0
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 5,
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        assert_eq!(policy.delay_for(0), Duration::ZERO);

        let ms = |attempt| policy.delay_for(attempt).as_millis() as u64;
        assert!((100..=110).contains(&ms(1)));
        assert!((200..=220).contains(&ms(2)));
        assert!((400..=440).contains(&ms(3)));
        assert!((1_000..=1_100).contains(&ms(10)));
    }

    #[test]
    fn test_delay_huge_attempt_does_not_overflow() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay_ms: u64::MAX / 2,
            max_delay_ms: 5_000,
        };
        for attempt in [2, 64, 200, u32::MAX] {
            let d = policy.delay_for(attempt);
            assert!(d >= Duration::from_millis(5_000) && d <= Duration::from_millis(5_500));
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let mut retries = Vec::new();
        let result = retry_with_backoff(
            &fast_policy(3),
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(Flaky(true))
                    } else {
                        Ok(attempt)
                    }
                }
            },
            |attempt, _, _| retries.push(attempt),
        )
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(retries, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let result: Result<(), _> =
            retry_with_backoff(&fast_policy(2), |_| async { Err(Flaky(true)) }, |_, _, _| {}).await;
        let err = result.unwrap_err();
        assert_eq!(err.attempts, 2);
    }

    #[tokio::test]
    async fn test_non_retryable_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(
            &fast_policy(5),
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Flaky(false)) }
            },
            |_, _, _| {},
        )
        .await;
        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let result = retry_with_backoff(&fast_policy(0), |_| async { Ok::<_, Flaky>(7) }, |_, _, _| {}).await;
        assert_eq!(result.unwrap(), 7);
    }
}
