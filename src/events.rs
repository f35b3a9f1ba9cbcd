//! Lifecycle event stream for execution observability.
//!
//! The execution controller emits structured events to an attached sink.
//! The default sink forwards events to `tracing`; tests attach a collecting
//! sink to assert on the exact sequence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Structured lifecycle events emitted during execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionEvent {
    ExecutionStarted {
        agent: String,
        task: String,
    },
    StageStarted {
        agent: String,
        stage: String,
        index: usize,
    },
    StageCompleted {
        agent: String,
        stage: String,
        index: usize,
        success: bool,
    },
    DelegationStarted {
        delegation_id: String,
        from_agent: String,
        to_agent: String,
    },
    DelegationCompleted {
        delegation_id: String,
        from_agent: String,
        to_agent: String,
        success: bool,
    },
    TimeoutWarning {
        agent: String,
        task: String,
        elapsed_ms: u64,
        remaining_ms: u64,
        total_ms: u64,
    },
    CacheHit {
        provider: String,
        key: String,
    },
    CacheMiss {
        provider: String,
        key: String,
    },
    CircuitOpened {
        provider: String,
    },
    CircuitClosed {
        provider: String,
    },
    AgentSkipped {
        agent: String,
        failed_dependency: String,
    },
    ExecutionCompleted {
        agent: String,
        success: bool,
        duration_ms: u64,
    },
}

/// Timestamped event envelope delivered to sinks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: ExecutionEvent,
}

impl EventEnvelope {
    pub fn new(event: ExecutionEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Sink receiving lifecycle events.
///
/// Implementations must be cheap; emitting an event is never allowed to fail
/// the execution that produced it.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ExecutionEvent);
}

/// Default sink that forwards events to the `tracing` subscriber
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: ExecutionEvent) {
        match &event {
            ExecutionEvent::ExecutionStarted { agent, task } => {
                info!(%agent, %task, "execution started");
            }
            ExecutionEvent::StageStarted { agent, stage, index } => {
                debug!(%agent, %stage, index, "stage started");
            }
            ExecutionEvent::StageCompleted {
                agent,
                stage,
                index,
                success,
            } => {
                info!(%agent, %stage, index, success, "stage completed");
            }
            ExecutionEvent::DelegationStarted {
                delegation_id,
                from_agent,
                to_agent,
            } => {
                info!(%delegation_id, %from_agent, %to_agent, "delegation started");
            }
            ExecutionEvent::DelegationCompleted {
                delegation_id,
                from_agent,
                to_agent,
                success,
            } => {
                info!(
                    %delegation_id,
                    %from_agent, %to_agent, success, "delegation completed"
                );
            }
            ExecutionEvent::TimeoutWarning {
                agent,
                elapsed_ms,
                remaining_ms,
                total_ms,
                ..
            } => {
                warn!(
                    %agent,
                    elapsed_ms, remaining_ms, total_ms, "approaching execution timeout"
                );
            }
            ExecutionEvent::CacheHit { provider, key } => {
                debug!(%provider, %key, "response cache hit");
            }
            ExecutionEvent::CacheMiss { provider, key } => {
                debug!(%provider, %key, "response cache miss");
            }
            ExecutionEvent::CircuitOpened { provider } => {
                warn!(%provider, "circuit breaker opened");
            }
            ExecutionEvent::CircuitClosed { provider } => {
                info!(%provider, "circuit breaker closed");
            }
            ExecutionEvent::AgentSkipped {
                agent,
                failed_dependency,
            } => {
                warn!(%agent, %failed_dependency, "agent skipped");
            }
            ExecutionEvent::ExecutionCompleted {
                agent,
                success,
                duration_ms,
            } => {
                info!(%agent, success, duration_ms, "execution completed");
            }
        }
    }
}

/// Test sink that records every emitted event in order
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<EventEnvelope>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EventEnvelope> {
        self.events.lock().expect("event sink poisoned").clone()
    }

    /// Count events of a given kind by discriminant name
    pub fn count(&self, kind: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| kind_name(&e.event) == kind)
            .count()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: ExecutionEvent) {
        self.events
            .lock()
            .expect("event sink poisoned")
            .push(EventEnvelope::new(event));
    }
}

fn kind_name(event: &ExecutionEvent) -> &'static str {
    match event {
        ExecutionEvent::ExecutionStarted { .. } => "execution_started",
        ExecutionEvent::StageStarted { .. } => "stage_started",
        ExecutionEvent::StageCompleted { .. } => "stage_completed",
        ExecutionEvent::DelegationStarted { .. } => "delegation_started",
        ExecutionEvent::DelegationCompleted { .. } => "delegation_completed",
        ExecutionEvent::TimeoutWarning { .. } => "timeout_warning",
        ExecutionEvent::CacheHit { .. } => "cache_hit",
        ExecutionEvent::CacheMiss { .. } => "cache_miss",
        ExecutionEvent::CircuitOpened { .. } => "circuit_opened",
        ExecutionEvent::CircuitClosed { .. } => "circuit_closed",
        ExecutionEvent::AgentSkipped { .. } => "agent_skipped",
        ExecutionEvent::ExecutionCompleted { .. } => "execution_completed",
    }
}
