//! Retry logic with exponential backoff
//!
//! Delays grow as `initial_delay * backoff_multiplier^attempt` and are capped
//! at `max_delay`. With the defaults (3s, x2, cap 30s) the sequence is
//! 3, 6, 12, 24, 30, 30...
//!
//! # Example
//!
//! ```no_run
//! use channel_archiver::retry::{IsRetryable, download_with_retry};
//! use channel_archiver::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! download_with_retry(&config, || async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, is_transient_message};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, dropped connections, network errors) should return `true`.
/// Permanent failures (unknown channel, authentication, corrupt state) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) | Error::Timeout => true,
            Error::Io(e) | Error::File { source: e, .. } => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
            ),
            // Collaborator errors are opaque; classify them by their message
            Error::Client(msg) => is_transient_message(msg),
            Error::RetriesExhausted { .. } => false,
            Error::Config { .. }
            | Error::Serialization(_)
            | Error::NotFound(_)
            | Error::Auth(_)
            | Error::Cancelled
            | Error::Other(_) => false,
        }
    }
}

/// Delay before retry number `attempt` (0-based), capped at `max_delay`
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let factor = config.backoff_multiplier.max(1.0).powi(attempt.min(63) as i32);
    let secs = config.initial_delay.as_secs_f64() * factor;
    if !secs.is_finite() || secs >= config.max_delay.as_secs_f64() {
        return config.max_delay;
    }
    Duration::from_secs_f64(secs).min(config.max_delay)
}

/// Delay actually slept for retry number `attempt`, jitter applied if enabled
///
/// Jitter never pushes the delay past `max_delay`.
pub fn retry_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let delay = backoff_delay(config, attempt);
    if config.jitter {
        add_jitter(delay).min(config.max_delay)
    } else {
        delay
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// `config.max_attempts` is the number of retries after the first call.
/// Returns the successful result, the first non-retryable error, or the last
/// error once all retries are used. Callers tell the last two apart through
/// [`IsRetryable::is_retryable`] on the returned error.
pub async fn download_with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                let delay = retry_delay(config, attempt);
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(
                        error = %e,
                        "Operation failed with non-retryable error"
                    );
                }
                return Err(e);
            }
        }
    }
}

/// Turn a retryable error returned after exhaustion into [`Error::RetriesExhausted`]
pub fn into_exhausted(scope: impl Into<String>, config: &RetryConfig, err: Error) -> Error {
    if err.is_retryable() {
        Error::RetriesExhausted {
            scope: scope.into(),
            attempts: config.max_attempts + 1,
            last_error: Box::new(err),
        }
    } else {
        err
    }
}

/// Sleep for `duration` unless `cancel` fires first
///
/// Returns [`Error::Cancelled`] when shutdown was requested during the pause.
pub async fn pause(
    duration: Duration,
    cancel: &tokio_util::sync::CancellationToken,
) -> Result<(), Error> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    if duration.is_zero() {
        return Ok(());
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => Ok(()),
        _ = cancel.cancelled() => Err(Error::Cancelled),
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
