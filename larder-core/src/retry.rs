//! Bounded retry policy applied around every store operation.
//!
//! Each failure is classified as transient, rate-limited or terminal:
//!
//! - transient failures are retried with exponential backoff plus jitter, up to
//!   [`RetryConfig::max_attempts`] attempts in total;
//! - rate-limited failures wait for the backend's suggested duration (or
//!   [`RetryConfig::rate_limit_delay_ms`]) and are budgeted separately through
//!   [`RetryConfig::max_rate_limit_retries`];
//! - everything else is returned on first occurrence.
//!
//! An optional deadline bounds the whole operation, waits included. The policy never
//! holds backend locks; each attempt acquires and releases whatever it needs.

use rand::Rng;
use std::{future::Future, time::Duration};
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, error, warn};

use crate::{
    config::RetryConfig,
    error::{DocumentStoreError, DocumentStoreResult},
};

/// How the retry policy treats a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Transient,
    /// Carries the backend's suggested wait, if it gave one.
    RateLimited(Option<Duration>),
    Terminal,
}

impl RetryClass {
    pub fn of(error: &DocumentStoreError) -> Self {
        match error {
            DocumentStoreError::Transient(_) => RetryClass::Transient,
            DocumentStoreError::RateLimited { retry_after, .. } => RetryClass::RateLimited(*retry_after),
            _ => RetryClass::Terminal,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Deadline for an operation starting now, from the configured default timeout.
    pub fn default_deadline(&self) -> Option<Instant> {
        self.config
            .operation_timeout()
            .map(|timeout| Instant::now() + timeout)
    }

    /// Wait after the `failures`-th consecutive transient failure (1-based):
    /// `base * 2^(failures - 1)` plus up to `max_jitter_ms` of jitter.
    pub fn backoff_delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        let base = self.config.base_delay_ms.saturating_mul(1u64 << exponent);
        let jitter = match self.config.max_jitter_ms {
            0 => 0,
            max => rand::thread_rng().gen_range(0..=max),
        };

        Duration::from_millis(base.saturating_add(jitter))
    }

    /// Runs `attempt` until it succeeds, fails terminally, exhausts a budget or the
    /// deadline passes.
    pub async fn execute<T, F, Fut>(
        &self,
        operation: &str,
        deadline: Option<Instant>,
        mut attempt: F,
    ) -> DocumentStoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DocumentStoreResult<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempts = 0u32;
        let mut transient_failures = 0u32;
        let mut rate_limited = 0u32;

        loop {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(timed_out(operation, attempts));
            }

            attempts += 1;
            debug!(operation, attempt = attempts, "executing store operation");

            let outcome = match deadline {
                Some(deadline) => match timeout_at(deadline, attempt()).await {
                    Ok(outcome) => outcome,
                    Err(_) => return Err(timed_out(operation, attempts)),
                },
                None => attempt().await,
            };

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let delay = match RetryClass::of(&err) {
                RetryClass::Terminal => return Err(err),
                RetryClass::Transient => {
                    transient_failures += 1;
                    if transient_failures >= max_attempts {
                        return Err(exhausted(operation, attempts, err));
                    }
                    self.backoff_delay(transient_failures)
                }
                RetryClass::RateLimited(suggested) => {
                    rate_limited += 1;
                    if rate_limited > self.config.max_rate_limit_retries {
                        return Err(exhausted(operation, attempts, err));
                    }
                    suggested.unwrap_or_else(|| self.config.rate_limit_delay())
                }
            };

            if let Some(deadline) = deadline {
                if Instant::now() + delay >= deadline {
                    return Err(timed_out(operation, attempts));
                }
            }

            warn!(
                operation,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "store operation failed, retrying"
            );
            sleep(delay).await;
        }
    }
}

fn exhausted(operation: &str, attempts: u32, last: DocumentStoreError) -> DocumentStoreError {
    error!(operation, attempts, error = %last, "store operation exhausted its retry budget");

    DocumentStoreError::RetriesExhausted {
        operation: operation.to_string(),
        attempts,
        last: Box::new(last),
    }
}

fn timed_out(operation: &str, attempts: u32) -> DocumentStoreError {
    error!(operation, attempts, "store operation deadline elapsed");

    DocumentStoreError::Timeout {
        operation: operation.to_string(),
        attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::{
        future::ready,
        sync::atomic::{AtomicU32, Ordering},
    };

    fn transient() -> DocumentStoreError {
        DocumentStoreError::Transient("503 service unavailable".into())
    }

    fn throttled(after_ms: Option<u64>) -> DocumentStoreError {
        DocumentStoreError::RateLimited {
            message: "request rate is large".into(),
            retry_after: after_ms.map(Duration::from_millis),
        }
    }

    #[test]
    fn backoff_doubles_from_base() {
        let policy = RetryPolicy::new(RetryConfig { max_jitter_ms: 0, ..RetryConfig::default() });

        assert_eq!(policy.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(400));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy::default();

        for _ in 0..100 {
            let delay = policy.backoff_delay(2);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(250));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_transient_attempt() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result = policy
            .execute("get", None, || {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                ready(if call < 3 { Err(transient()) } else { Ok(call) })
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(300), "waited {waited:?}");
        assert!(waited <= Duration::from_millis(400), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn stops_after_max_transient_attempts() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let err = policy
            .execute("create", None, || {
                calls.fetch_add(1, Ordering::SeqCst);
                ready(Err::<(), _>(transient()))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(err.retries_exhausted());
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(matches!(err, DocumentStoreError::RetriesExhausted { attempts: 3, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_errors_are_not_retried() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let err = policy
            .execute("create", None, || {
                calls.fetch_add(1, Ordering::SeqCst);
                ready(Err::<(), _>(DocumentStoreError::conflict("r1", "recipe", "recipes")))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(!err.retries_exhausted());
    }

    #[tokio::test(start_paused = true)]
    async fn honours_suggested_rate_limit_wait() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        policy
            .execute("query", None, || {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                ready(if call == 1 { Err(throttled(Some(500))) } else { Ok(()) })
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_without_hint_uses_default_wait() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        policy
            .execute("query", None, || {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                ready(if call == 1 { Err(throttled(None)) } else { Ok(()) })
            })
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limits_do_not_spend_the_transient_budget() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result = policy
            .execute("update", None, || {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                ready(match call {
                    1 | 3 => Err(throttled(Some(10))),
                    2 | 4 => Err(transient()),
                    _ => Ok(call),
                })
            })
            .await;

        assert_eq!(result.unwrap(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_retries_are_bounded() {
        let policy = RetryPolicy::new(RetryConfig { max_rate_limit_retries: 2, ..RetryConfig::default() });
        let calls = AtomicU32::new(0);

        let err = policy
            .execute("delete", None, || {
                calls.fetch_add(1, Ordering::SeqCst);
                ready(Err::<(), _>(throttled(Some(10))))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(err.retries_exhausted());
        assert_eq!(err.kind(), ErrorKind::RateLimited);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cuts_off_retry_wait() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let deadline = Instant::now() + Duration::from_millis(170);

        let err = policy
            .execute("get", Some(deadline), || {
                calls.fetch_add(1, Ordering::SeqCst);
                ready(Err::<(), _>(transient()))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(!err.retries_exhausted());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_interrupts_slow_attempt() {
        let policy = RetryPolicy::default();
        let deadline = Instant::now() + Duration::from_secs(1);

        let err = policy
            .execute("query", Some(deadline), || async {
                sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DocumentStoreError::Timeout { attempts: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_deadline_skips_the_attempt() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let deadline = Instant::now();
        tokio::time::advance(Duration::from_millis(1)).await;

        let err = policy
            .execute("create", Some(deadline), || {
                calls.fetch_add(1, Ordering::SeqCst);
                ready(Ok(()))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(err, DocumentStoreError::Timeout { attempts: 0, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn no_retries_config_fails_on_first_transient_error() {
        let policy = RetryPolicy::new(RetryConfig::no_retries());
        let calls = AtomicU32::new(0);

        let err = policy
            .execute("get", None, || {
                calls.fetch_add(1, Ordering::SeqCst);
                ready(Err::<(), _>(transient()))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(err.retries_exhausted());
    }
}
