//! Retry policy for procedure invocations
//!
//! Invokers make exactly one backend call; whether a failed call is repeated
//! is decided here, by the orchestrator, with exponential backoff.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::errors::InvocationError;

/// Configuration for invocation retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Single attempt, never retry
    pub fn none() -> Self {
        Self::default()
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable cause, or
/// exhausts `config.max_attempts`
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    mut operation: F,
    operation_name: &str,
) -> Result<T, InvocationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, InvocationError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        "Invocation '{}' succeeded on attempt {}/{}",
                        operation_name, attempt, max_attempts
                    );
                }
                return Ok(result);
            }
            Err(err) if attempt < max_attempts && err.cause.is_retryable() => {
                let delay = calculate_delay(config, attempt);
                warn!(
                    "Invocation '{}' failed on attempt {}/{}, retrying in {:?}: {}",
                    operation_name, attempt, max_attempts, delay, err
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if attempt > 1 {
                    warn!(
                        "Invocation '{}' failed after {} attempts: {}",
                        operation_name, attempt, err
                    );
                }
                return Err(err);
            }
        }
    }
}

/// Backoff before retry number `attempt` (1-based)
fn calculate_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1) as i32;
    let base = config.initial_delay.as_nanos() as f64 * config.backoff_multiplier.powi(exponent);
    let capped = base.min(config.max_delay.as_nanos() as f64);

    let nanos = if config.jitter {
        // +/- 25%
        capped * (0.75 + fastrand::f64() * 0.5)
    } else {
        capped
    };

    Duration::from_nanos(nanos.max(0.0).round() as u64)
}
