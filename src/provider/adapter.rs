//! CLI provider adapter.
//!
//! Wraps one external LLM CLI as a uniform request/response interface. Every
//! execution runs through the circuit breaker, the optional response cache,
//! and the retry policy; the subprocess itself is bounded by the resolved
//! timeout and killed on expiry or cancellation.
//!
//! ## CLI contract
//!
//! The configured command is invoked with supported model parameters as
//! flags and the prompt as the final argument. Stdout becomes the response
//! content; token counts are filled when the CLI reports them in a JSON
//! envelope and left at zero otherwise.

use crate::config::ProviderSection;
use crate::events::{EventSink, ExecutionEvent, TracingSink};
use crate::provider::availability::AvailabilityTracker;
use crate::provider::cache::ResponseCache;
use crate::provider::circuit::{CircuitBreaker, CircuitTransition};
use crate::provider::retry::execute_with_retry;
use crate::provider::types::{
    CircuitBreakerConfig, FinishReason, HealthStatus, Parameter, ParameterSupport, ProviderError,
    ProviderRequest, ProviderResponse, RetryConfig, TokenUsage,
};
use chrono::Utc;
use futures::future::BoxFuture;
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Uniform provider interface consumed by the router and the execution
/// controller
pub trait Provider: Send + Sync {
    /// Provider identifier as configured
    fn name(&self) -> &str;

    /// Selection priority; lower wins
    fn priority(&self) -> u32;

    /// Configured per-request timeout
    fn default_timeout(&self) -> Duration;

    /// Execute one request, bounded by `timeout`
    fn execute(
        &self,
        request: ProviderRequest,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<ProviderResponse, ProviderError>>;

    /// Probe whether the CLI is installed and responsive
    fn health_check(&self) -> BoxFuture<'_, Result<HealthStatus, ProviderError>>;

    /// Cached availability, refreshed per the uptime-adaptive TTL
    fn is_available(&self) -> BoxFuture<'_, bool>;

    fn supports_parameter(&self, parameter: Parameter) -> bool;
}

impl std::fmt::Debug for dyn Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider").field("name", &self.name()).finish()
    }
}

/// Whether mock mode is forced by the environment.
///
/// The mock flag wins when present (any value other than an explicit off
/// forces mock); otherwise AI-IDE indicator variables enable mock mode so
/// orchestration inside an AI IDE never shells out to a real provider.
pub fn mock_mode_from_env() -> bool {
    match std::env::var("AUTOMATOSX_MOCK_PROVIDERS") {
        Ok(value) if value == "0" || value.eq_ignore_ascii_case("false") => false,
        Ok(_) => true,
        Err(_) => {
            std::env::var_os("CLAUDECODE").is_some()
                || std::env::var_os("CURSOR_TRACE_ID").is_some()
        }
    }
}

/// Adapter around one external CLI provider
pub struct CliAdapter {
    name: String,
    settings: ProviderSection,
    support: ParameterSupport,
    retry: RetryConfig,
    breaker: CircuitBreaker,
    availability: Mutex<AvailabilityTracker>,
    cache: Option<Arc<ResponseCache>>,
    sink: Arc<dyn EventSink>,
    mock: bool,
    /// Parameters already reported as dropped, to log each only once
    dropped_params: std::sync::Mutex<HashSet<Parameter>>,
    log_dir: Option<PathBuf>,
}

impl CliAdapter {
    pub fn new(name: impl Into<String>, settings: ProviderSection) -> Self {
        let name = name.into();
        let canonical = crate::team::canonical_provider(&name).unwrap_or("unknown");
        Self {
            support: ParameterSupport::for_provider(canonical),
            retry: RetryConfig::default(),
            breaker: CircuitBreaker::new(name.clone(), CircuitBreakerConfig::default()),
            availability: Mutex::new(AvailabilityTracker::new()),
            cache: None,
            sink: Arc::new(TracingSink),
            mock: mock_mode_from_env(),
            dropped_params: std::sync::Mutex::new(HashSet::new()),
            log_dir: None,
            name,
            settings,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker = CircuitBreaker::new(self.name.clone(), config);
        self
    }

    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Directory receiving subprocess audit logs (command line, stdout,
    /// stderr per request)
    pub fn with_log_dir(mut self, log_dir: PathBuf) -> Self {
        self.log_dir = Some(log_dir);
        self
    }

    #[cfg(test)]
    pub fn with_mock(mut self, mock: bool) -> Self {
        self.mock = mock;
        self
    }

    async fn execute_pipeline(
        &self,
        request: ProviderRequest,
        timeout: Duration,
    ) -> Result<ProviderResponse, ProviderError> {
        let params = request.model_params();

        if let Some(ref cache) = self.cache
            && let Some(content) = cache.get(&self.name, &request.prompt, &params).await
        {
            self.sink.emit(ExecutionEvent::CacheHit {
                provider: self.name.clone(),
                key: crate::provider::cache::cache_key(&self.name, &request.prompt, &params),
            });
            return Ok(ProviderResponse {
                request_id: request.id,
                content,
                model: request.model.clone().unwrap_or_else(|| "cached".to_string()),
                token_usage: TokenUsage::default(),
                latency_ms: 0,
                finish_reason: FinishReason::Stop,
            });
        }
        if let Some(ref cache) = self.cache
            && cache.enabled()
        {
            self.sink.emit(ExecutionEvent::CacheMiss {
                provider: self.name.clone(),
                key: crate::provider::cache::cache_key(&self.name, &request.prompt, &params),
            });
        }

        let prompt = request.prompt.clone();
        let result = execute_with_retry(&self.retry, move |attempt| {
            let request = request.clone();
            Box::pin(self.execute_attempt(request, timeout, attempt))
        })
        .await;

        if let Ok(ref response) = result
            && let Some(ref cache) = self.cache
        {
            cache
                .put(&self.name, &prompt, &params, &response.content)
                .await;
        }
        result
    }

    async fn execute_attempt(
        &self,
        request: ProviderRequest,
        timeout: Duration,
        attempt: u32,
    ) -> Result<ProviderResponse, ProviderError> {
        self.breaker.check().await?;
        debug!(provider = %self.name, attempt, "executing provider request");

        let outcome = self.execute_once(&request, timeout).await;
        match outcome {
            Ok(response) => {
                if self.breaker.record_success().await == Some(CircuitTransition::Closed) {
                    self.sink.emit(ExecutionEvent::CircuitClosed {
                        provider: self.name.clone(),
                    });
                }
                let mut tracker = self.availability.lock().await;
                tracker.record(true);
                Ok(response)
            }
            Err(error) => {
                if self.breaker.record_failure().await == Some(CircuitTransition::Opened) {
                    self.sink.emit(ExecutionEvent::CircuitOpened {
                        provider: self.name.clone(),
                    });
                }
                Err(error)
            }
        }
    }

    async fn execute_once(
        &self,
        request: &ProviderRequest,
        timeout: Duration,
    ) -> Result<ProviderResponse, ProviderError> {
        let started = Instant::now();

        if self.mock {
            let head: String = request.prompt.chars().take(80).collect();
            return Ok(ProviderResponse {
                request_id: request.id,
                content: format!("Mock response for: {}", head),
                model: request.model.clone().unwrap_or_else(|| "mock".to_string()),
                token_usage: TokenUsage::default(),
                latency_ms: started.elapsed().as_millis() as u64,
                finish_reason: FinishReason::Stop,
            });
        }

        let (program, base_args) = self.command_line();
        let mut command = Command::new(&program);
        command.args(&base_args);

        for (parameter, flag, value) in [
            (
                Parameter::MaxTokens,
                "--max-tokens",
                request.max_tokens.map(|v| v.to_string()),
            ),
            (
                Parameter::Temperature,
                "--temperature",
                request.temperature.map(|v| v.to_string()),
            ),
            (
                Parameter::TopP,
                "--top-p",
                request.top_p.map(|v| v.to_string()),
            ),
        ] {
            let Some(value) = value else { continue };
            if self.support.supports(parameter) {
                command.arg(flag).arg(value);
            } else {
                self.warn_dropped(parameter);
            }
        }
        if let Some(ref model) = request.model {
            command.arg("--model").arg(model);
        }

        let full_prompt = match request.system_prompt {
            Some(ref system) => format!("{}\n\n{}", system, request.prompt),
            None => request.prompt.clone(),
        };
        command.arg("--").arg(&full_prompt);
        command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        self.write_command_log(&request.id, &program, &base_args, &full_prompt)
            .await;

        let child = command.spawn().map_err(|e| ProviderError::ExecutionError {
            name: self.name.clone(),
            message: format!("failed to spawn {}: {}", program, e),
        })?;

        // Dropping the wait future on timeout kills the subprocess via
        // kill_on_drop, which also covers caller cancellation.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ProviderError::ExecutionError {
                    name: self.name.clone(),
                    message: e.to_string(),
                });
            }
            Err(_) => {
                return Err(ProviderError::Timeout {
                    name: self.name.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        };

        let latency_ms = started.elapsed().as_millis() as u64;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        self.write_output_logs(&request.id, &stdout, &stderr).await;

        if !output.status.success() {
            return Err(ProviderError::ExecutionError {
                name: self.name.clone(),
                message: format!(
                    "exit code {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            });
        }

        let (content, token_usage, model) = parse_cli_output(&stdout);
        Ok(ProviderResponse {
            request_id: request.id,
            content,
            model: model
                .or_else(|| request.model.clone())
                .unwrap_or_else(|| self.name.clone()),
            token_usage,
            latency_ms,
            finish_reason: FinishReason::Stop,
        })
    }

    fn command_line(&self) -> (String, Vec<String>) {
        let mut parts = self.settings.command.split_whitespace();
        let program = parts.next().unwrap_or_default().to_string();
        (program, parts.map(str::to_string).collect())
    }

    fn warn_dropped(&self, parameter: Parameter) {
        let mut dropped = self.dropped_params.lock().expect("dropped params poisoned");
        if dropped.insert(parameter) {
            warn!(
                "Provider {} does not support {:?}; dropping the parameter",
                self.name, parameter
            );
        }
    }

    async fn write_command_log(
        &self,
        request_id: &uuid::Uuid,
        program: &str,
        args: &[String],
        prompt: &str,
    ) {
        let Some(ref log_dir) = self.log_dir else {
            return;
        };
        if let Err(e) = tokio::fs::create_dir_all(log_dir).await {
            warn!("Failed to create provider log directory: {}", e);
            return;
        }
        let mut line = String::from(program);
        for arg in args {
            line.push(' ');
            line.push_str(&shell_escape::escape(arg.clone().into()));
        }
        line.push_str(" -- ");
        line.push_str(&shell_escape::escape(prompt.to_string().into()));

        let content = format!(
            "#!/bin/bash\n# Provider: {} | Request: {} | {}\n\n{}\n",
            self.name,
            request_id,
            Utc::now().format("%Y-%m-%d %H:%M:%S%.3f UTC"),
            line
        );
        let path = log_dir.join(format!("{}.command.sh", request_id));
        if let Err(e) = tokio::fs::write(&path, content).await {
            warn!("Failed to write command log: {}", e);
        }
    }

    async fn write_output_logs(&self, request_id: &uuid::Uuid, stdout: &str, stderr: &str) {
        let Some(ref log_dir) = self.log_dir else {
            return;
        };
        if !stdout.is_empty() {
            let path = log_dir.join(format!("{}.stdout.txt", request_id));
            if let Err(e) = tokio::fs::write(&path, stdout).await {
                warn!("Failed to write stdout log: {}", e);
            }
        }
        if !stderr.is_empty() {
            let path = log_dir.join(format!("{}.stderr.txt", request_id));
            if let Err(e) = tokio::fs::write(&path, stderr).await {
                warn!("Failed to write stderr log: {}", e);
            }
        }
    }
}

/// Extract content, token usage, and model from CLI stdout.
///
/// CLIs that emit a JSON envelope (`{"result": ..., "usage": {...}}` or
/// `{"content": ...}`) are unwrapped; anything else is treated as plain
/// text with zero token counts.
pub(crate) fn parse_cli_output(stdout: &str) -> (String, TokenUsage, Option<String>) {
    let trimmed = stdout.trim();
    if trimmed.starts_with('{')
        && let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed)
    {
        let content = value
            .get("result")
            .or_else(|| value.get("content"))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        if let Some(content) = content {
            let usage = value.get("usage");
            let token = |key: &str| {
                usage
                    .and_then(|u| u.get(key))
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0)
            };
            let prompt_tokens = token("inputTokens").max(token("input_tokens"));
            let completion_tokens = token("outputTokens").max(token("output_tokens"));
            let usage = TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            };
            let model = value
                .get("model")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            return (content, usage, model);
        }
    }
    (trimmed.to_string(), TokenUsage::default(), None)
}

impl Provider for CliAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> u32 {
        self.settings.priority
    }

    fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.timeout)
    }

    fn execute(
        &self,
        request: ProviderRequest,
        timeout: Duration,
    ) -> BoxFuture<'_, Result<ProviderResponse, ProviderError>> {
        Box::pin(self.execute_pipeline(request, timeout))
    }

    fn health_check(&self) -> BoxFuture<'_, Result<HealthStatus, ProviderError>> {
        Box::pin(async move {
            if self.mock {
                return Ok(HealthStatus {
                    healthy: true,
                    latency_ms: Some(0),
                    checked_at: Utc::now(),
                });
            }

            let (program, _) = self.command_line();
            if which::which(&program).is_err() {
                return Ok(HealthStatus {
                    healthy: false,
                    latency_ms: None,
                    checked_at: Utc::now(),
                });
            }

            let started = Instant::now();
            let probe = Command::new(&program)
                .arg("--version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .status();
            let healthy = matches!(
                tokio::time::timeout(Duration::from_secs(5), probe).await,
                Ok(Ok(status)) if status.success()
            );
            Ok(HealthStatus {
                healthy,
                latency_ms: healthy.then(|| started.elapsed().as_millis() as u64),
                checked_at: Utc::now(),
            })
        })
    }

    fn is_available(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            if !self.settings.enabled {
                return false;
            }
            {
                let tracker = self.availability.lock().await;
                if let Some(cached) = tracker.cached() {
                    return cached;
                }
            }
            let healthy = self
                .health_check()
                .await
                .map(|status| status.healthy)
                .unwrap_or(false);
            self.availability.lock().await.record(healthy);
            healthy
        })
    }

    fn supports_parameter(&self, parameter: Parameter) -> bool {
        self.support.supports(parameter)
    }
}
