//! Retry policy with failure classification and exponential backoff.
//!
//! Failures are classified as retryable or fatal by substring. Retryable
//! failures are re-attempted with exponential backoff capped at a maximum
//! delay, with ±25 % jitter to avoid thundering herds.

use crate::provider::types::{ProviderError, RetryConfig};
use futures::future::BoxFuture;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, warn};

/// Substrings marking a failure message as retryable
const RETRYABLE_PATTERNS: &[&str] = &[
    "timeout",
    "econnreset",
    "econnrefused",
    "socket hang up",
    "network error",
    "rate limit",
    "too many requests",
    "502",
    "503",
    "504",
    "resource_exhausted",
    "unavailable",
    "deadline_exceeded",
    "internal",
    "rate_limit",
];

/// Substrings marking a failure as fatal regardless of other matches
const FATAL_PATTERNS: &[&str] = &["invalid_argument", "permission_denied"];

/// Whether a provider error is worth retrying
pub fn is_retryable(error: &ProviderError) -> bool {
    match error {
        ProviderError::Timeout { .. } => true,
        ProviderError::ExecutionError { message, .. } => is_retryable_message(message),
        ProviderError::Unavailable { .. } => true,
        ProviderError::NotFound { .. }
        | ProviderError::NoAvailableProviders
        | ProviderError::CircuitOpen { .. } => false,
    }
}

/// Classify a raw failure message
pub fn is_retryable_message(message: &str) -> bool {
    let lowered = message.to_lowercase();
    if FATAL_PATTERNS.iter().any(|p| lowered.contains(p)) {
        return false;
    }
    RETRYABLE_PATTERNS.iter().any(|p| lowered.contains(p))
}

/// Backoff delay for a zero-based attempt index: `initial × factor^attempt`,
/// capped at `max_delay`, with ±25 % jitter
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let base = config.initial_delay.as_millis() as f64
        * config.backoff_factor.powi(attempt.min(16) as i32);
    let capped = base.min(config.max_delay.as_millis() as f64);
    let jitter = rand::rng().random_range(0.75..=1.25);
    Duration::from_millis((capped * jitter) as u64)
}

/// Run `operation` up to `config.max_attempts` times, sleeping between
/// retryable failures
pub async fn execute_with_retry<'a, T, F>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, ProviderError>
where
    F: FnMut(u32) -> BoxFuture<'a, Result<T, ProviderError>>,
{
    let mut last_error = None;

    for attempt in 0..config.max_attempts.max(1) {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => {
                let retryable = is_retryable(&error);
                warn!(
                    attempt,
                    retryable,
                    "provider attempt failed: {}",
                    error
                );
                if !retryable || attempt + 1 >= config.max_attempts {
                    return Err(error);
                }
                let delay = backoff_delay(config, attempt);
                debug!("Retrying in {:?}", delay);
                last_error = Some(error);
                tokio::time::sleep(delay).await;
            }
        }
    }

    Err(last_error.unwrap_or(ProviderError::NoAvailableProviders))
}
