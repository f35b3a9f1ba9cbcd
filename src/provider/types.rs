use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// A single request executed by a provider adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub id: Uuid,
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
    pub top_p: Option<f64>,
}

impl ProviderRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt: prompt.into(),
            system_prompt: None,
            model: None,
            temperature: None,
            max_tokens: None,
            top_p: None,
        }
    }

    /// The model parameters relevant to response-cache keying
    pub fn model_params(&self) -> ModelParams {
        ModelParams {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: self.top_p,
        }
    }
}

/// Model parameters serialized with sorted keys for cache-key stability
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub max_tokens: Option<u64>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
}

/// A provider adapter's answer to one request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub request_id: Uuid,
    pub content: String,
    pub model: String,
    pub token_usage: TokenUsage,
    pub latency_ms: u64,
    pub finish_reason: FinishReason,
}

/// Token counts reported by the CLI; zero when the CLI does not report them
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    Timeout,
    Error,
}

/// Health probe result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub latency_ms: Option<u64>,
    pub checked_at: DateTime<Utc>,
}

/// Tunable request parameters an adapter may or may not honor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Parameter {
    MaxTokens,
    Temperature,
    TopP,
}

/// Which tunable parameters a provider's CLI honors
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ParameterSupport {
    pub max_tokens: bool,
    pub temperature: bool,
    pub top_p: bool,
}

impl ParameterSupport {
    pub fn supports(&self, parameter: Parameter) -> bool {
        match parameter {
            Parameter::MaxTokens => self.max_tokens,
            Parameter::Temperature => self.temperature,
            Parameter::TopP => self.top_p,
        }
    }

    /// Default support matrix for a canonical provider identifier
    pub fn for_provider(canonical: &str) -> Self {
        match canonical {
            "claude" => Self {
                max_tokens: true,
                temperature: false,
                top_p: false,
            },
            "gemini" => Self {
                max_tokens: true,
                temperature: true,
                top_p: true,
            },
            "codex" => Self {
                max_tokens: true,
                temperature: true,
                top_p: false,
            },
            _ => Self {
                max_tokens: false,
                temperature: false,
                top_p: false,
            },
        }
    }
}

/// Retry policy applied around provider execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            backoff_factor: 2.0,
        }
    }
}

impl From<&crate::config::RetrySection> for RetryConfig {
    fn from(section: &crate::config::RetrySection) -> Self {
        Self {
            max_attempts: section.max_attempts,
            initial_delay: Duration::from_millis(section.initial_delay_ms),
            max_delay: Duration::from_millis(section.max_delay_ms),
            backoff_factor: section.backoff_factor,
        }
    }
}

/// Circuit breaker thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close it again
    pub success_threshold: u32,
    /// How long the breaker stays open before allowing a probe call
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(30),
        }
    }
}

/// Provider-layer errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("provider not found: {name}")]
    NotFound { name: String },
    #[error("provider unavailable: {name}")]
    Unavailable { name: String },
    #[error("no available providers")]
    NoAvailableProviders,
    #[error("provider {name} timed out after {timeout_ms} ms")]
    Timeout { name: String, timeout_ms: u64 },
    #[error("provider {name} execution failed: {message}")]
    ExecutionError { name: String, message: String },
    #[error("circuit breaker open for provider {name}")]
    CircuitOpen { name: String },
}

impl ProviderError {
    /// Stable numeric code grouped by kind
    pub fn code(&self) -> u16 {
        match self {
            ProviderError::NotFound { .. } => 5001,
            ProviderError::Unavailable { .. } => 5002,
            ProviderError::NoAvailableProviders => 5003,
            ProviderError::Timeout { .. } => 5004,
            ProviderError::ExecutionError { .. } => 5005,
            ProviderError::CircuitOpen { .. } => 5006,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_support_lookup() {
        let support = ParameterSupport::for_provider("claude");
        assert!(support.supports(Parameter::MaxTokens));
        assert!(!support.supports(Parameter::Temperature));
        assert!(!support.supports(Parameter::TopP));
    }

    #[test]
    fn test_retry_config_from_section() {
        let section = crate::config::RetrySection {
            max_attempts: 5,
            initial_delay_ms: 10,
            max_delay_ms: 100,
            backoff_factor: 2.0,
        };
        let config = RetryConfig::from(&section);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.initial_delay, Duration::from_millis(10));
    }

    #[test]
    fn test_error_codes_grouped_by_kind() {
        assert_eq!(ProviderError::NoAvailableProviders.code(), 5003);
        assert_eq!(
            ProviderError::Timeout {
                name: "claude".to_string(),
                timeout_ms: 1000
            }
            .code(),
            5004
        );
    }
}
