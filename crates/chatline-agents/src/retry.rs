use std::future::Future;
use std::time::Duration;

use chatline_common::{Error, Result};
use tracing::warn;

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Wait `step * n` after the n-th failed attempt.
    Linear { step: Duration },
    /// Retry immediately.
    None,
}

impl Backoff {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Linear { step } => step.saturating_mul(attempt),
            Backoff::None => Duration::ZERO,
        }
    }
}

/// Bounded retry with a pluggable back-off and a predicate that decides
/// which errors are worth another attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
    pub retryable: fn(&Error) -> bool,
}

/// Only unusable provider output is retried; transport and auth failures
/// surface immediately.
pub fn retry_malformed(error: &Error) -> bool {
    matches!(error, Error::MalformedResponse(_))
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Linear {
                step: Duration::from_secs(1),
            },
            retryable: retry_malformed,
        }
    }
}

impl RetryPolicy {
    pub fn linear(max_attempts: u32, step: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Linear { step },
            ..Self::default()
        }
    }

    pub fn with_retryable(mut self, retryable: fn(&Error) -> bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Run `op` until it succeeds, returns a non-retryable error, or the
    /// attempt ceiling is reached. The last error is returned on exhaustion.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= max_attempts || !(self.retryable)(&err) {
                        return Err(err);
                    }
                    let delay = self.backoff.delay_after(attempt);
                    warn!(attempt, max_attempts, ?delay, "retrying after error: {err}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn linear_backoff_grows_with_attempt() {
        let backoff = Backoff::Linear {
            step: Duration::from_millis(250),
        };
        assert_eq!(backoff.delay_after(1), Duration::from_millis(250));
        assert_eq!(backoff.delay_after(3), Duration::from_millis(750));
        assert_eq!(Backoff::None.delay_after(5), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_retryable_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::linear(3, Duration::from_secs(1));
        let started = Instant::now();

        let result = policy
            .run(|_| {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(Error::MalformedResponse("not json".into()))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s after the first failure, 2s after the second.
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn returns_last_error_when_exhausted() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::linear(3, Duration::from_millis(10));

        let err = policy
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err::<(), _>(Error::MalformedResponse(format!("attempt {attempt}"))) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(err.to_string().contains("attempt 3"));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_fails_fast() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let err = policy
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(Error::Auth("bad key".into())) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Auth(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn custom_predicate_widens_what_is_retried() {
        fn transient(err: &Error) -> bool {
            matches!(err, Error::ServiceUnavailable(_) | Error::MalformedResponse(_))
        }

        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::linear(3, Duration::from_millis(10)).with_retryable(transient);

        let result = policy
            .run(|_| {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call == 0 {
                        Err(Error::ServiceUnavailable("overloaded".into()))
                    } else {
                        Ok(call)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
