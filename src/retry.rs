//! Retry logic with a fixed delay
//!
//! The request executor retries every failure the same way: up to
//! `max_retries` further attempts after the first one, separated by a constant
//! delay. There is no exponential growth and no jitter.
//!
//! # Example
//!
//! ```no_run
//! use coursegen_client::retry::retry_fixed;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), String> {
//! let value = retry_fixed(3, Duration::from_millis(1000), |attempt| async move {
//!     if attempt < 2 { Err("flaky".to_string()) } else { Ok(attempt) }
//! })
//! .await
//! .map_err(|failure| failure.error)?;
//! assert_eq!(value, 2);
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

/// The error of the final attempt, with the total number of attempts made
#[derive(Debug)]
pub struct RetryFailure<E> {
    /// Error returned by the last attempt
    pub error: E,
    /// Attempts performed, first try included
    pub attempts: u32,
}

/// Execute an async operation, retrying failures with a fixed delay
///
/// `operation` receives the zero-based attempt number. It is called at most
/// `max_retries + 1` times; between two calls the task sleeps `delay`. The
/// sleep uses the tokio clock, so tests with a paused runtime observe the
/// delays without waiting for them.
pub async fn retry_fixed<F, Fut, T, E>(
    max_retries: u32,
    delay: Duration,
    mut operation: F,
) -> Result<T, RetryFailure<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation(attempt).await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if attempt < max_retries => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_retries = max_retries,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    attempts = attempt + 1,
                    "Operation failed after all retry attempts exhausted"
                );
                return Err(RetryFailure {
                    error: e,
                    attempts: attempt + 1,
                });
            }
        }
    }
}
