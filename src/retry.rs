//! Retry with exponential backoff for outbound calls
//!
//! Used for the generation backend and Telegram sends. Item-store lookups are
//! deliberately absent: a failed comment is dropped, not retried.
//!
//! # Example
//!
//! ```no_run
//! use hn_digest::config::RetryConfig;
//! use hn_digest::error::Error;
//! use hn_digest::retry::with_retry;
//!
//! # async fn example() -> Result<(), Error> {
//! let config = RetryConfig::default();
//! let reply = with_retry(&config, "chat completion", || async {
//!     Ok::<String, Error>("summary".to_string())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{DeliveryError, Error, GenerationError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Classifies errors as transient (worth retrying) or permanent
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
            ),
            Error::Generation(GenerationError::Status { status, .. })
            | Error::Delivery(DeliveryError::Status { status, .. }) => is_transient_status(*status),
            // An empty reply is usually a backend hiccup
            Error::Generation(GenerationError::EmptyResponse) => true,
            Error::Generation(GenerationError::Malformed(_)) => false,
            // Telegram refuses content deterministically (too long, bad markup)
            Error::Delivery(DeliveryError::Rejected { .. }) => false,
            Error::Fetch(_) => false,
            Error::Config { .. }
            | Error::Serialization(_)
            | Error::Yaml(_)
            | Error::ConfigWatch(_)
            | Error::NotFound(_)
            | Error::ShuttingDown
            | Error::Other(_) => false,
        }
    }
}

fn is_transient_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..=599).contains(&status)
}

/// Run `operation`, retrying transient failures with exponential backoff
///
/// `what` names the operation in log events. Returns the first success, the
/// first permanent error, or the last error once `max_attempts` retries are
/// used up.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, what: &str, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(operation = what, attempts = attempt + 1, "Succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    operation = what,
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "Transient failure, retrying"
                );

                let wait = if config.jitter { add_jitter(delay) } else { delay };
                tokio::time::sleep(wait).await;

                let next_delay =
                    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next_delay.min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(operation = what, error = %e, attempts = attempt + 1, "Retries exhausted");
                } else {
                    tracing::error!(operation = what, error = %e, "Permanent failure");
                }
                return Err(e);
            }
        }
    }
}

/// Stretch a delay by a uniform random factor in `[1, 2]`
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
