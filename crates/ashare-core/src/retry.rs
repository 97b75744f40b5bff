//! Bounded retry with backoff around a single source call.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::data_source::SourceError;

/// Backoff strategy between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Fixed delay between retries.
    Fixed { delay: Duration },
    /// Exponential delay: `base * (factor ^ attempt)`, capped at `max`,
    /// optionally with +/- 50% random jitter.
    Exponential {
        base: Duration,
        factor: f64,
        max: Duration,
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(200),
            factor: 2.0,
            max: Duration::from_secs(3),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let scaled = base.as_secs_f64() * factor.powi(attempt as i32);
                let mut delay = Duration::from_secs_f64(scaled.min(max.as_secs_f64()));

                if jitter {
                    // Uniform draw over [delay/2, delay*3/2].
                    let delay_ms = delay.as_millis() as u64;
                    let spread = delay_ms / 2;
                    delay = Duration::from_millis(
                        delay_ms - spread + fastrand::u64(0..=spread * 2),
                    );
                }

                delay
            }
        }
    }
}

/// Retry budget applied to each provider in the failover chain.
///
/// Total attempts per provider = `max_retries + 1`. Only transient errors
/// (timeout, rate limit, unavailable) are retried; a `NotFound` or
/// `Malformed` answer fails the provider immediately.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Upper bound for a single attempt, enforced with a timer around the
    /// adapter future.
    pub attempt_timeout: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            attempt_timeout: Duration::from_secs(10),
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, attempt_timeout: Duration) -> Self {
        Self {
            max_retries,
            attempt_timeout,
            ..Self::default()
        }
    }

    /// Run one source call under this policy, producing either the value or
    /// the last attempt's error.
    pub async fn run<T, F, Fut>(&self, call: F) -> Result<T, SourceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        self.run_observed(call, |_, _| {}).await
    }

    /// Like [`Self::run`], additionally invoking `on_attempt` with every
    /// attempt's latency and outcome. The failover engine uses this for
    /// per-attempt source bookkeeping.
    pub async fn run_observed<T, F, Fut, O>(
        &self,
        mut call: F,
        mut on_attempt: O,
    ) -> Result<T, SourceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
        O: FnMut(Duration, Result<(), &SourceError>),
    {
        let mut attempt = 0;
        loop {
            let started = Instant::now();
            let outcome = match tokio::time::timeout(self.attempt_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(SourceError::timeout(format!(
                    "attempt exceeded {}ms",
                    self.attempt_timeout.as_millis()
                ))),
            };

            match outcome {
                Ok(value) => {
                    on_attempt(started.elapsed(), Ok(()));
                    return Ok(value);
                }
                Err(error) => {
                    on_attempt(started.elapsed(), Err(&error));
                    if error.retryable() && attempt < self.max_retries {
                        tokio::time::sleep(self.backoff.delay(attempt)).await;
                        attempt += 1;
                    } else {
                        return Err(error);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn no_backoff() -> Backoff {
        Backoff::Fixed {
            delay: Duration::ZERO,
        }
    }

    #[test]
    fn fixed_backoff_is_constant() {
        let backoff = Backoff::Fixed {
            delay: Duration::from_millis(100),
        };

        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(7), Duration::from_millis(100));
    }

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_secs(1),
            jitter: false,
        };

        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(4), Duration::from_secs(1));
    }

    #[test]
    fn jitter_stays_within_half_band() {
        let backoff = Backoff::Exponential {
            base: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_secs(1),
            jitter: true,
        };

        for _ in 0..10 {
            for attempt in 0..5 {
                let expected = (100.0 * 2_f64.powi(attempt as i32)).min(1000.0);
                let delay_ms = backoff.delay(attempt).as_millis() as f64;
                assert!(delay_ms >= expected * 0.49);
                assert!(delay_ms <= expected * 1.51);
            }
        }
    }

    #[tokio::test]
    async fn retries_transient_errors_then_succeeds() {
        let policy = RetryPolicy {
            max_retries: 3,
            attempt_timeout: Duration::from_secs(1),
            backoff: no_backoff(),
        };
        let calls = AtomicU32::new(0);

        let value = policy
            .run(|| async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(SourceError::unavailable("upstream down"))
                } else {
                    Ok(42)
                }
            })
            .await
            .expect("third attempt should succeed");

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_terminal_errors() {
        let policy = RetryPolicy {
            max_retries: 5,
            attempt_timeout: Duration::from_secs(1),
            backoff: no_backoff(),
        };
        let calls = AtomicU32::new(0);

        let error = policy
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(SourceError::not_found("no such instrument"))
            })
            .await
            .expect_err("must fail");

        assert_eq!(error.kind(), crate::SourceErrorKind::NotFound);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_retry_budget_and_reports_last_error() {
        let policy = RetryPolicy {
            max_retries: 2,
            attempt_timeout: Duration::from_secs(1),
            backoff: no_backoff(),
        };
        let calls = AtomicU32::new(0);

        let error = policy
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(SourceError::rate_limited("quota spent"))
            })
            .await
            .expect_err("must fail");

        assert_eq!(error.kind(), crate::SourceErrorKind::RateLimited);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn observer_sees_every_attempt() {
        let policy = RetryPolicy {
            max_retries: 2,
            attempt_timeout: Duration::from_secs(1),
            backoff: no_backoff(),
        };
        let mut failures = 0u32;
        let mut successes = 0u32;
        let calls = AtomicU32::new(0);

        policy
            .run_observed(
                || async {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(SourceError::timeout("slow upstream"))
                    } else {
                        Ok(())
                    }
                },
                |_, outcome| match outcome {
                    Ok(()) => successes += 1,
                    Err(_) => failures += 1,
                },
            )
            .await
            .expect("third attempt should succeed");

        assert_eq!(failures, 2);
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn slow_attempts_are_cut_off_by_the_timer() {
        let policy = RetryPolicy {
            max_retries: 0,
            attempt_timeout: Duration::from_millis(20),
            backoff: no_backoff(),
        };

        let error = policy
            .run(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(1)
            })
            .await
            .expect_err("must time out");

        assert_eq!(error.kind(), crate::SourceErrorKind::Timeout);
    }
}
