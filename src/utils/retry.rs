use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

// ============================================================================
// Bounded retry for transient upstream failures
// ============================================================================
//
// Only idempotent calls go through here. A permanent failure returns at
// once; a transient one is retried after a fixed pause until the attempt
// budget is spent, and the last error is returned.
//
// ============================================================================

/// Classifies errors worth another attempt (timeouts, unavailable upstream)
pub trait IsTransient {
    fn is_transient(&self) -> bool;
}

#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Pause between attempts
    pub pause: Duration,
}

impl RetryConfig {
    /// One internal retry after a short pause
    pub fn once() -> Self {
        Self {
            max_attempts: 2,
            pause: Duration::from_millis(25),
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or runs out of
/// attempts. The closure receives the 1-based attempt number.
pub async fn retry_on_transient<F, Fut, T, E>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display + IsTransient,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let error = match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(operation = operation_name, attempt, "Recovered on retry");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        if !error.is_transient() || attempt >= max_attempts {
            tracing::debug!(
                operation = operation_name,
                attempt,
                transient = error.is_transient(),
                error = %error,
                "Giving up"
            );
            return Err(error);
        }

        tracing::warn!(
            operation = operation_name,
            attempt,
            error = %error,
            "Transient failure, retrying"
        );
        tokio::time::sleep(config.pause).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    enum LookupError {
        Timeout,
        Rejected,
    }

    impl Display for LookupError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl IsTransient for LookupError {
        fn is_transient(&self) -> bool {
            *self == LookupError::Timeout
        }
    }

    /// Fails with `errors` in order, then succeeds
    async fn scripted(calls: &AtomicU32, errors: &[LookupError]) -> Result<&'static str, LookupError> {
        let call = calls.fetch_add(1, Ordering::SeqCst) as usize;
        match errors.get(call) {
            Some(LookupError::Timeout) => Err(LookupError::Timeout),
            Some(LookupError::Rejected) => Err(LookupError::Rejected),
            None => Ok("found"),
        }
    }

    #[tokio::test]
    async fn test_single_retry_recovers_from_timeout() {
        let calls = AtomicU32::new(0);
        let script = [LookupError::Timeout];

        let result = retry_on_transient("lookup", &RetryConfig::once(), |_| scripted(&calls, &script)).await;

        assert_eq!(result, Ok("found"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let script = [LookupError::Timeout, LookupError::Timeout, LookupError::Timeout];

        let result = retry_on_transient("lookup", &RetryConfig::once(), |_| scripted(&calls, &script)).await;

        assert_eq!(result, Err(LookupError::Timeout));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let calls = AtomicU32::new(0);
        let script = [LookupError::Rejected];

        let result = retry_on_transient("lookup", &RetryConfig::once(), |_| scripted(&calls, &script)).await;

        assert_eq!(result, Err(LookupError::Rejected));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
