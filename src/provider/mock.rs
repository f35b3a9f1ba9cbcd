//! Deterministic in-process provider for tests and offline development.
//!
//! The responder closure receives each request and produces the full
//! response or error, so tests can script sequences such as "fail twice,
//! then succeed" without a real CLI.

use crate::provider::adapter::Provider;
use crate::provider::types::{
    FinishReason, HealthStatus, Parameter, ProviderError, ProviderRequest, ProviderResponse,
    TokenUsage,
};
use chrono::Utc;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

type Responder =
    dyn Fn(&ProviderRequest, u32) -> Result<String, ProviderError> + Send + Sync + 'static;

/// Scriptable provider returning canned responses
pub struct MockProvider {
    name: String,
    priority: u32,
    available: AtomicBool,
    calls: AtomicU32,
    responder: Arc<Responder>,
}

impl MockProvider {
    /// Provider that echoes the prompt with a `Mock: ` prefix
    pub fn echo(name: impl Into<String>, priority: u32) -> Self {
        Self::with_responder(name, priority, |request, _call| {
            Ok(format!("Mock: {}", request.prompt))
        })
    }

    /// Provider answering every request with the same content
    pub fn fixed(name: impl Into<String>, priority: u32, content: impl Into<String>) -> Self {
        let content = content.into();
        Self::with_responder(name, priority, move |_request, _call| Ok(content.clone()))
    }

    /// Provider driven by a custom responder; the second argument is the
    /// zero-based call count
    pub fn with_responder<F>(name: impl Into<String>, priority: u32, responder: F) -> Self
    where
        F: Fn(&ProviderRequest, u32) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            priority,
            available: AtomicBool::new(true),
            calls: AtomicU32::new(0),
            responder: Arc::new(responder),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of execute calls observed so far
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn default_timeout(&self) -> Duration {
        Duration::from_secs(60)
    }

    fn execute(
        &self,
        request: ProviderRequest,
        _timeout: Duration,
    ) -> BoxFuture<'_, Result<ProviderResponse, ProviderError>> {
        Box::pin(async move {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let content = (self.responder)(&request, call)?;
            Ok(ProviderResponse {
                request_id: request.id,
                content,
                model: request.model.unwrap_or_else(|| "mock".to_string()),
                token_usage: TokenUsage::default(),
                latency_ms: 0,
                finish_reason: FinishReason::Stop,
            })
        })
    }

    fn health_check(&self) -> BoxFuture<'_, Result<HealthStatus, ProviderError>> {
        Box::pin(async move {
            Ok(HealthStatus {
                healthy: self.available.load(Ordering::SeqCst),
                latency_ms: Some(0),
                checked_at: Utc::now(),
            })
        })
    }

    fn is_available(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move { self.available.load(Ordering::SeqCst) })
    }

    fn supports_parameter(&self, _parameter: Parameter) -> bool {
        true
    }
}
