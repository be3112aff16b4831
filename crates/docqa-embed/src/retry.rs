//! Bounded exponential backoff for remote calls.
use std::future::Future;
use std::time::Duration;

use docqa_core::config::HttpSettings;
use docqa_core::Error;

/// Failure of a single remote attempt.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallError {
    /// Timeouts, connection failures, HTTP 429 and 5xx.
    #[error("{0}")]
    Transient(String),
    #[error("{0}")]
    Fatal(String),
}

impl From<CallError> for Error {
    fn from(err: CallError) -> Self {
        Error::ExternalService(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&HttpSettings::default())
    }
}

impl From<&HttpSettings> for RetryPolicy {
    fn from(http: &HttpSettings) -> Self {
        Self {
            max_retries: http.max_retries,
            initial_backoff_ms: http.initial_backoff_ms,
            max_backoff_ms: http.max_backoff_ms,
            backoff_multiplier: http.backoff_multiplier,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt + 1`, capped at `max_backoff_ms`.
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let base = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        base.min(self.max_backoff_ms as f64) as u64
    }
}

/// Run `operation` until it succeeds, fails fatally, or retries run out.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, operation: F) -> Result<T, CallError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, CallError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(CallError::Transient(msg)) if attempt < policy.max_retries => {
                let backoff_ms = policy.backoff_ms(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max = policy.max_retries,
                    backoff_ms,
                    error = %msg,
                    "retrying after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy { max_retries, initial_backoff_ms: 1, max_backoff_ms: 4, backoff_multiplier: 2.0 }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_ms(0), 500);
        assert_eq!(policy.backoff_ms(1), 1000);
        assert_eq!(policy.backoff_ms(2), 2000);
        assert_eq!(policy.backoff_ms(10), 8000);
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = with_retry(&fast(3), || {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(CallError::Transient("503".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), _> = with_retry(&fast(2), || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CallError::Transient("timeout".into()))
            }
        })
        .await;
        assert_eq!(result, Err(CallError::Transient("timeout".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), _> = with_retry(&fast(5), || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CallError::Fatal("401".into()))
            }
        })
        .await;
        assert!(matches!(result, Err(CallError::Fatal(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(CallError::Transient("HTTP 503".into()).to_string(), "HTTP 503");
        let err: Error = CallError::Fatal("401".into()).into();
        assert_eq!(err.kind(), docqa_core::ErrorKind::ExternalService);
        assert_eq!(err.to_string(), "External service error: 401");
    }
}
