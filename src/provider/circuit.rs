//! Circuit breaker isolating a failing provider.
//!
//! Consecutive failures open the breaker; while open, calls fail fast until
//! the open timeout elapses, after which a single probe call is allowed in
//! half-open state. Consecutive half-open successes close the breaker again;
//! a half-open failure re-opens it and resets the success counter.

use crate::provider::types::{CircuitBreakerConfig, ProviderError};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open { opened_at: DateTime<Utc> },
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    /// True while a half-open probe call is in flight; only one is allowed
    probe_in_flight: bool,
}

/// Per-adapter three-state circuit breaker; safe to share across
/// concurrent calls
#[derive(Debug)]
pub struct CircuitBreaker {
    provider: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

/// Observed breaker transition, surfaced as an event by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitTransition {
    Opened,
    Closed,
}

impl CircuitBreaker {
    pub fn new(provider: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            provider: provider.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                probe_in_flight: false,
            }),
        }
    }

    /// Check whether a call may proceed. While open, fails fast until the
    /// open timeout elapses; then admits exactly one probe call.
    pub async fn check(&self) -> Result<(), ProviderError> {
        let mut inner = self.inner.lock().await;
        match inner.state.clone() {
            CircuitState::Closed => Ok(()),
            CircuitState::Open { opened_at } => {
                let elapsed = Utc::now().signed_duration_since(opened_at);
                let open_timeout = chrono::Duration::from_std(self.config.open_timeout)
                    .unwrap_or_else(|_| chrono::Duration::seconds(30));
                if elapsed >= open_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    inner.probe_in_flight = true;
                    info!("Circuit breaker half-open for {}", self.provider);
                    Ok(())
                } else {
                    Err(ProviderError::CircuitOpen {
                        name: self.provider.clone(),
                    })
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    Err(ProviderError::CircuitOpen {
                        name: self.provider.clone(),
                    })
                } else {
                    inner.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    /// Record a successful call; returns a transition when the breaker closed
    pub async fn record_success(&self) -> Option<CircuitTransition> {
        let mut inner = self.inner.lock().await;
        inner.consecutive_failures = 0;
        match inner.state {
            CircuitState::Closed => None,
            CircuitState::HalfOpen => {
                inner.probe_in_flight = false;
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.half_open_successes = 0;
                    info!("Circuit breaker closed for {}", self.provider);
                    Some(CircuitTransition::Closed)
                } else {
                    None
                }
            }
            CircuitState::Open { .. } => None,
        }
    }

    /// Record a failed call; returns a transition when the breaker opened
    pub async fn record_failure(&self) -> Option<CircuitTransition> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open {
                        opened_at: Utc::now(),
                    };
                    warn!(
                        "Circuit breaker opened for {} after {} consecutive failures",
                        self.provider, inner.consecutive_failures
                    );
                    Some(CircuitTransition::Opened)
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                inner.probe_in_flight = false;
                inner.half_open_successes = 0;
                inner.state = CircuitState::Open {
                    opened_at: Utc::now(),
                };
                warn!("Circuit breaker re-opened for {}", self.provider);
                Some(CircuitTransition::Opened)
            }
            CircuitState::Open { .. } => None,
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn breaker(failure_threshold: u32, success_threshold: u32, open_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "mock",
            CircuitBreakerConfig {
                failure_threshold,
                success_threshold,
                open_timeout: Duration::from_millis(open_ms),
            },
        )
    }

    #[tokio::test]
    async fn test_opens_after_threshold() {
        let breaker = breaker(3, 1, 1000);
        assert!(breaker.record_failure().await.is_none());
        assert!(breaker.record_failure().await.is_none());
        assert_eq!(
            breaker.record_failure().await,
            Some(CircuitTransition::Opened)
        );
        assert!(breaker.check().await.is_err());
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let breaker = breaker(3, 1, 1000);
        breaker.record_failure().await;
        breaker.record_failure().await;
        breaker.record_success().await;
        breaker.record_failure().await;
        breaker.record_failure().await;
        assert!(matches!(breaker.state().await, CircuitState::Closed));
    }

    #[tokio::test]
    async fn test_half_open_probe_after_timeout() {
        let breaker = breaker(1, 1, 20);
        breaker.record_failure().await;
        assert!(breaker.check().await.is_err());

        tokio::time::sleep(Duration::from_millis(30)).await;
        // One probe admitted, a concurrent second call fails fast.
        assert!(breaker.check().await.is_ok());
        assert!(breaker.check().await.is_err());

        assert_eq!(
            breaker.record_success().await,
            Some(CircuitTransition::Closed)
        );
        assert!(breaker.check().await.is_ok());
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let breaker = breaker(1, 2, 20);
        breaker.record_failure().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(breaker.check().await.is_ok());
        assert_eq!(
            breaker.record_failure().await,
            Some(CircuitTransition::Opened)
        );
        assert!(breaker.check().await.is_err());
    }

    #[tokio::test]
    async fn test_success_threshold_requires_consecutive_successes() {
        let breaker = breaker(1, 2, 20);
        breaker.record_failure().await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(breaker.check().await.is_ok());
        assert!(breaker.record_success().await.is_none());
        assert!(matches!(breaker.state().await, CircuitState::HalfOpen));

        assert!(breaker.check().await.is_ok());
        assert_eq!(
            breaker.record_success().await,
            Some(CircuitTransition::Closed)
        );
    }
}
