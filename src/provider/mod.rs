//! # Provider Layer
//!
//! Wraps external LLM CLIs as uniform request/response adapters and routes
//! between them.
//!
//! ## Core Components
//!
//! - **[`CliAdapter`]**: One external CLI behind the [`Provider`] trait
//! - **[`ProviderRouter`]**: Priority-based selection over available providers
//! - **[`CircuitBreaker`]**: Three-state failure isolation per adapter
//! - **[`ResponseCache`]**: Two-tier (memory + persistent) response cache
//! - **[`AvailabilityTracker`]**: Uptime-adaptive availability-check TTL
//!
//! ## Execution Pipeline
//!
//! Every request runs through circuit breaker admission, a response-cache
//! lookup, and the retry policy with exponential backoff; the subprocess is
//! bounded by the resolved timeout and killed on expiry or cancellation.
//!
//! Setting the mock environment flag (or running inside an AI IDE) replaces
//! all subprocess execution with deterministic synthetic responses.

/// CLI adapter and the [`Provider`] trait.
pub mod adapter;

/// Uptime-adaptive availability cache.
pub mod availability;

/// Two-tier response cache.
pub mod cache;

/// Circuit breaker.
pub mod circuit;

/// Scriptable mock provider for tests and offline development.
pub mod mock;

/// Retry classification and backoff.
pub mod retry;

/// Provider registry and routing.
pub mod router;

/// Request/response records, parameter matrix, and errors.
pub mod types;


pub use adapter::{CliAdapter, Provider, mock_mode_from_env};
pub use availability::AvailabilityTracker;
pub use cache::{CacheConfig, CacheEntry, CacheStats, ResponseCache, cache_key};
pub use circuit::{CircuitBreaker, CircuitState, CircuitTransition};
pub use mock::MockProvider;
pub use router::ProviderRouter;
pub use types::{
    CircuitBreakerConfig, FinishReason, HealthStatus, ModelParams, Parameter, ParameterSupport,
    ProviderError, ProviderRequest, ProviderResponse, RetryConfig, TokenUsage,
};
