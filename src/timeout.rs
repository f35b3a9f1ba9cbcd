//! Layered timeout resolution and warning monitoring.
//!
//! The effective timeout for a task is resolved through a priority chain:
//! runtime override > agent-specific > team-specific > global > hardcoded
//! default. The monitor arms a one-shot warning timer at a configurable
//! fraction of the timeout; enforcement itself is the provider adapter's
//! job.

use crate::config::TimeoutSection;
use crate::events::{EventSink, ExecutionEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Hardcoded fallback timeout: 25 minutes
pub const DEFAULT_TIMEOUT_MS: u64 = 25 * 60 * 1000;

/// Default fraction of the timeout at which the warning fires
pub const DEFAULT_WARNING_THRESHOLD: f64 = 0.8;

/// Where a resolved timeout value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutSource {
    Runtime,
    Agent,
    Team,
    Global,
    Default,
}

/// The resolved timeout for one task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTimeout {
    /// Effective timeout in milliseconds
    pub value: u64,
    pub source: TimeoutSource,
    /// Warning point in milliseconds: `floor(value × warning_threshold)`
    pub warning_at: u64,
    pub warnings_enabled: bool,
}

impl ResolvedTimeout {
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.value)
    }
}

/// Resolves effective timeouts from the layered configuration
#[derive(Debug, Clone)]
pub struct TimeoutResolver {
    config: TimeoutSection,
    default_timeout: Option<u64>,
    warnings_enabled: bool,
}

impl Default for TimeoutResolver {
    fn default() -> Self {
        Self::new(TimeoutSection::default(), None)
    }
}

impl TimeoutResolver {
    pub fn new(config: TimeoutSection, default_timeout: Option<u64>) -> Self {
        Self {
            config,
            default_timeout,
            warnings_enabled: true,
        }
    }

    pub fn with_warnings_enabled(mut self, enabled: bool) -> Self {
        self.warnings_enabled = enabled;
        self
    }

    /// Resolve the effective timeout for a task
    pub fn resolve(
        &self,
        agent: Option<&str>,
        team: Option<&str>,
        runtime: Option<u64>,
    ) -> ResolvedTimeout {
        let (value, source) = if let Some(runtime) = runtime {
            (runtime, TimeoutSource::Runtime)
        } else if let Some(value) = agent.and_then(|a| self.config.agents.get(a).copied()) {
            (value, TimeoutSource::Agent)
        } else if let Some(value) = team.and_then(|t| self.config.teams.get(t).copied()) {
            (value, TimeoutSource::Team)
        } else if let Some(value) = self.config.global {
            (value, TimeoutSource::Global)
        } else {
            (
                self.default_timeout.unwrap_or(DEFAULT_TIMEOUT_MS),
                TimeoutSource::Default,
            )
        };

        let threshold = self
            .config
            .warning_threshold
            .unwrap_or(DEFAULT_WARNING_THRESHOLD);
        ResolvedTimeout {
            value,
            source,
            warning_at: (value as f64 * threshold).floor() as u64,
            warnings_enabled: self.warnings_enabled,
        }
    }
}

/// Handle over an armed warning timer
#[derive(Debug)]
pub struct TimeoutMonitor {
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TimeoutMonitor {
    /// Arm a one-shot warning timer for the given resolved timeout.
    ///
    /// When the warning point passes, a `TimeoutWarning` event carrying
    /// elapsed, remaining, and total milliseconds is emitted to the sink.
    pub fn start(
        resolved: ResolvedTimeout,
        agent: impl Into<String>,
        task: impl Into<String>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        if !resolved.warnings_enabled {
            return Self { handle: None };
        }
        let agent = agent.into();
        let task = task.into();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(resolved.warning_at)).await;
            sink.emit(ExecutionEvent::TimeoutWarning {
                agent,
                task,
                elapsed_ms: resolved.warning_at,
                remaining_ms: resolved.value.saturating_sub(resolved.warning_at),
                total_ms: resolved.value,
            });
        });
        Self {
            handle: Some(handle),
        }
    }

    /// Cancel the warning timer; a no-op when it already fired
    pub fn stop(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("Timeout warning monitor stopped");
        }
    }
}

impl Drop for TimeoutMonitor {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingSink;
    use std::collections::HashMap;

    fn layered_config() -> TimeoutSection {
        TimeoutSection {
            global: Some(1_500_000),
            teams: HashMap::from([("engineering".to_string(), 1_800_000)]),
            agents: HashMap::from([("backend".to_string(), 1_200_000)]),
            warning_threshold: Some(0.8),
        }
    }

    #[test]
    fn test_agent_wins_over_team_and_global() {
        let resolver = TimeoutResolver::new(layered_config(), None);
        let resolved = resolver.resolve(Some("backend"), Some("engineering"), None);
        assert_eq!(resolved.value, 1_200_000);
        assert_eq!(resolved.source, TimeoutSource::Agent);
        assert_eq!(resolved.warning_at, 960_000);
    }

    #[test]
    fn test_runtime_wins_over_agent() {
        let resolver = TimeoutResolver::new(layered_config(), None);
        let resolved = resolver.resolve(Some("backend"), Some("engineering"), Some(1_800_000));
        assert_eq!(resolved.value, 1_800_000);
        assert_eq!(resolved.source, TimeoutSource::Runtime);
        assert_eq!(resolved.warning_at, 1_440_000);
    }

    #[test]
    fn test_team_then_global_then_default() {
        let resolver = TimeoutResolver::new(layered_config(), None);

        let resolved = resolver.resolve(Some("frontend"), Some("engineering"), None);
        assert_eq!(resolved.value, 1_800_000);
        assert_eq!(resolved.source, TimeoutSource::Team);

        let resolved = resolver.resolve(Some("frontend"), Some("design"), None);
        assert_eq!(resolved.value, 1_500_000);
        assert_eq!(resolved.source, TimeoutSource::Global);

        let resolver = TimeoutResolver::new(TimeoutSection::default(), None);
        let resolved = resolver.resolve(None, None, None);
        assert_eq!(resolved.value, DEFAULT_TIMEOUT_MS);
        assert_eq!(resolved.source, TimeoutSource::Default);
    }

    #[test]
    fn test_configured_default_timeout() {
        let resolver = TimeoutResolver::new(TimeoutSection::default(), Some(600_000));
        let resolved = resolver.resolve(None, None, None);
        assert_eq!(resolved.value, 600_000);
        assert_eq!(resolved.source, TimeoutSource::Default);
    }

    #[test]
    fn test_warning_threshold_defaults() {
        let resolver = TimeoutResolver::new(TimeoutSection::default(), Some(1000));
        let resolved = resolver.resolve(None, None, None);
        assert_eq!(resolved.warning_at, 800);
    }

    #[tokio::test]
    async fn test_monitor_emits_warning() {
        let sink = Arc::new(CollectingSink::new());
        let resolved = ResolvedTimeout {
            value: 50,
            source: TimeoutSource::Runtime,
            warning_at: 10,
            warnings_enabled: true,
        };
        let _monitor = TimeoutMonitor::start(
            resolved,
            "backend",
            "task",
            Arc::clone(&sink) as Arc<dyn EventSink>,
        );

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(sink.count("timeout_warning"), 1);
    }

    #[tokio::test]
    async fn test_stop_cancels_warning() {
        let sink = Arc::new(CollectingSink::new());
        let resolved = ResolvedTimeout {
            value: 100,
            source: TimeoutSource::Runtime,
            warning_at: 30,
            warnings_enabled: true,
        };
        let monitor = TimeoutMonitor::start(
            resolved,
            "backend",
            "task",
            Arc::clone(&sink) as Arc<dyn EventSink>,
        );
        monitor.stop();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(sink.count("timeout_warning"), 0);
    }
}
