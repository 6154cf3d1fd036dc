//! The retry-with-backoff policy for [`crate::error::TarifaError::TransientIOError`].

use std::time::Duration;

use crate::error::{Result, TarifaError};

/// Base delay before the first retry.
pub const BASE_DELAY: Duration = Duration::from_secs(1);

/// Maximum number of attempts (the first try plus two retries), per §7:
/// "Retry with exponential backoff (base 1s, up to 3 tries)".
pub const MAX_ATTEMPTS: u32 = 3;

/// Run `operation` up to [`MAX_ATTEMPTS`] times, doubling the delay after
/// each [`TarifaError::TransientIOError`] failure starting from
/// [`BASE_DELAY`]. Any other error, or exhausting all attempts, is
/// returned immediately.
pub async fn retry<T, F, Fut>(mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    let mut delay = BASE_DELAY;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32> = retry(|| async {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(TarifaError::TransientIOError {
                    operation: "fetch_bars".to_string(),
                    message: "connection reset".to_string(),
                })
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32> = retry(|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(TarifaError::TransientIOError {
                operation: "fetch_bars".to_string(),
                message: "still down".to_string(),
            })
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn non_retryable_errors_short_circuit() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32> = retry(|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(TarifaError::CorruptCurveError("non-monotonic".to_string()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
