//! Typed application configuration.
//!
//! The configuration is consumed as a typed record deserialized from JSON.
//! Validation collects every offending path instead of stopping at the first
//! problem, and merging is an explicit section-wise overlay rather than a
//! deep spread.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// Provider settings keyed by provider identifier
    pub providers: HashMap<String, ProviderSection>,
    pub memory: MemorySection,
    pub workspace: WorkspaceSection,
    pub logging: LoggingSection,
    pub execution: ExecutionSection,
}

/// Per-provider configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSection {
    pub enabled: bool,
    /// Lower value wins during provider selection
    pub priority: u32,
    /// Execution timeout in milliseconds, at least 1000
    pub timeout: u64,
    /// The external command to invoke, e.g. "claude"
    pub command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemorySection {
    pub max_entries: u64,
    pub persist_path: PathBuf,
    pub auto_cleanup: bool,
    pub cleanup_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkspaceSection {
    pub prd_path: PathBuf,
    pub tmp_path: PathBuf,
    pub auto_cleanup_tmp: bool,
    pub tmp_cleanup_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSection {
    pub level: LogLevel,
    pub path: PathBuf,
    pub console: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutionSection {
    /// Fallback timeout in milliseconds when no layered timeout matches
    pub default_timeout: Option<u64>,
    pub timeouts: Option<TimeoutSection>,
    pub max_concurrent_agents: u32,
    pub retry: Option<RetrySection>,
}

/// Layered timeout configuration consumed by the timeout manager
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutSection {
    /// Global timeout in milliseconds
    pub global: Option<u64>,
    /// Per-team timeouts in milliseconds
    #[serde(default)]
    pub teams: HashMap<String, u64>,
    /// Per-agent timeouts in milliseconds
    #[serde(default)]
    pub agents: HashMap<String, u64>,
    /// Fraction of the timeout at which a warning fires, within [0.5, 0.95]
    pub warning_threshold: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySection {
    pub max_attempts: u32,
    /// Initial backoff delay in milliseconds
    #[serde(rename = "initialDelay")]
    pub initial_delay_ms: u64,
    /// Backoff cap in milliseconds
    #[serde(rename = "maxDelay")]
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
}

/// Configuration validation failure listing every offending path
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid configuration: {}", problems.join("; "))]
pub struct ConfigError {
    pub problems: Vec<String>,
}

impl ConfigError {
    /// Stable numeric code for the configuration error kind
    pub fn code(&self) -> u16 {
        1000
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            memory: MemorySection::default(),
            workspace: WorkspaceSection::default(),
            logging: LoggingSection::default(),
            execution: ExecutionSection::default(),
        }
    }
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            persist_path: PathBuf::from(".automatosx/memory"),
            auto_cleanup: true,
            cleanup_days: 30,
        }
    }
}

impl Default for WorkspaceSection {
    fn default() -> Self {
        Self {
            prd_path: PathBuf::from(".automatosx/prd"),
            tmp_path: PathBuf::from(".automatosx/tmp"),
            auto_cleanup_tmp: true,
            tmp_cleanup_days: 7,
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            path: PathBuf::from(".automatosx/logs"),
            console: true,
        }
    }
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            default_timeout: None,
            timeouts: None,
            max_concurrent_agents: 4,
            retry: None,
        }
    }
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
        }
    }
}

impl AppConfig {
    /// Load a configuration from a JSON file and validate it
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError {
            problems: vec![format!("{}: {}", path.display(), e)],
        })?;
        let config: AppConfig = serde_json::from_str(&content).map_err(|e| ConfigError {
            problems: vec![format!("{}: {}", path.display(), e)],
        })?;
        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Validate the configuration, collecting every offending path
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        let enabled_count = self.providers.values().filter(|p| p.enabled).count();
        if !self.providers.is_empty() && enabled_count == 0 {
            problems.push("providers: at least one provider must be enabled".to_string());
        }

        for (name, provider) in &self.providers {
            if provider.priority == 0 {
                problems.push(format!(
                    "providers.{}.priority: must be a positive integer, got 0",
                    name
                ));
            }
            if provider.timeout < 1000 {
                problems.push(format!(
                    "providers.{}.timeout: must be at least 1000 ms, got {}",
                    name, provider.timeout
                ));
            }
            if provider.command.trim().is_empty() {
                problems.push(format!("providers.{}.command: must be non-empty", name));
            }
        }

        if self.memory.max_entries < 100 {
            problems.push(format!(
                "memory.maxEntries: must be at least 100, got {}",
                self.memory.max_entries
            ));
        }
        if self.memory.cleanup_days < 1 {
            problems.push(format!(
                "memory.cleanupDays: must be at least 1, got {}",
                self.memory.cleanup_days
            ));
        }

        if self.workspace.tmp_cleanup_days < 1 {
            problems.push(format!(
                "workspace.tmpCleanupDays: must be at least 1, got {}",
                self.workspace.tmp_cleanup_days
            ));
        }

        if self.execution.max_concurrent_agents == 0 {
            problems.push("execution.maxConcurrentAgents: must be positive, got 0".to_string());
        }

        if let Some(ref timeouts) = self.execution.timeouts {
            if let Some(threshold) = timeouts.warning_threshold
                && !(0.5..=0.95).contains(&threshold)
            {
                problems.push(format!(
                    "execution.timeouts.warningThreshold: must be within [0.5, 0.95], got {}",
                    threshold
                ));
            }
            if let Some(global) = timeouts.global
                && global == 0
            {
                problems.push("execution.timeouts.global: must be positive, got 0".to_string());
            }
            for (team, value) in &timeouts.teams {
                if *value == 0 {
                    problems.push(format!(
                        "execution.timeouts.teams.{}: must be positive, got 0",
                        team
                    ));
                }
            }
            for (agent, value) in &timeouts.agents {
                if *value == 0 {
                    problems.push(format!(
                        "execution.timeouts.agents.{}: must be positive, got 0",
                        agent
                    ));
                }
            }
        }

        if let Some(ref retry) = self.execution.retry {
            if retry.max_attempts == 0 {
                problems.push("execution.retry.maxAttempts: must be positive, got 0".to_string());
            }
            if retry.backoff_factor < 1.0 {
                problems.push(format!(
                    "execution.retry.backoffFactor: must be at least 1.0, got {}",
                    retry.backoff_factor
                ));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError { problems })
        }
    }

    /// Apply a partial overlay on top of this configuration.
    ///
    /// Each section has its own merge rule: provider entries replace whole
    /// entries by identifier, scalar sections replace wholesale, and the
    /// timeout maps merge key-wise.
    pub fn overlay(mut self, overlay: ConfigOverlay) -> Self {
        for (name, provider) in overlay.providers {
            self.providers.insert(name, provider);
        }
        if let Some(memory) = overlay.memory {
            self.memory = memory;
        }
        if let Some(workspace) = overlay.workspace {
            self.workspace = workspace;
        }
        if let Some(logging) = overlay.logging {
            self.logging = logging;
        }
        if let Some(execution) = overlay.execution {
            self.execution.default_timeout =
                execution.default_timeout.or(self.execution.default_timeout);
            if let Some(max) = execution.max_concurrent_agents {
                self.execution.max_concurrent_agents = max;
            }
            if let Some(retry) = execution.retry {
                self.execution.retry = Some(retry);
            }
            if let Some(timeouts) = execution.timeouts {
                let merged = match self.execution.timeouts.take() {
                    Some(mut base) => {
                        base.global = timeouts.global.or(base.global);
                        base.warning_threshold =
                            timeouts.warning_threshold.or(base.warning_threshold);
                        base.teams.extend(timeouts.teams);
                        base.agents.extend(timeouts.agents);
                        base
                    }
                    None => timeouts,
                };
                self.execution.timeouts = Some(merged);
            }
        }
        self
    }
}

/// Partial configuration used for overlay merging
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigOverlay {
    pub providers: HashMap<String, ProviderSection>,
    pub memory: Option<MemorySection>,
    pub workspace: Option<WorkspaceSection>,
    pub logging: Option<LoggingSection>,
    pub execution: Option<ExecutionOverlay>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutionOverlay {
    pub default_timeout: Option<u64>,
    pub timeouts: Option<TimeoutSection>,
    pub max_concurrent_agents: Option<u32>,
    pub retry: Option<RetrySection>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(enabled: bool, priority: u32, timeout: u64, command: &str) -> ProviderSection {
        ProviderSection {
            enabled,
            priority,
            timeout,
            command: command.to_string(),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_collects_all_problems() {
        let mut config = AppConfig::default();
        config
            .providers
            .insert("claude".to_string(), provider(true, 0, 500, ""));
        config.memory.max_entries = 10;
        config.execution.max_concurrent_agents = 0;

        let err = config.validate().unwrap_err();
        assert!(err.problems.len() >= 5, "problems: {:?}", err.problems);
        assert!(
            err.problems
                .iter()
                .any(|p| p.starts_with("providers.claude.priority"))
        );
        assert!(
            err.problems
                .iter()
                .any(|p| p.starts_with("providers.claude.timeout"))
        );
        assert!(
            err.problems
                .iter()
                .any(|p| p.starts_with("memory.maxEntries"))
        );
    }

    #[test]
    fn test_warning_threshold_bounds() {
        let mut config = AppConfig::default();
        for (value, ok) in [(0.5, true), (0.95, true), (0.49, false), (0.96, false)] {
            config.execution.timeouts = Some(TimeoutSection {
                warning_threshold: Some(value),
                ..Default::default()
            });
            assert_eq!(config.validate().is_ok(), ok, "threshold {}", value);
        }
    }

    #[test]
    fn test_overlay_merges_timeout_maps() {
        let mut base = AppConfig::default();
        base.execution.timeouts = Some(TimeoutSection {
            global: Some(1_500_000),
            teams: HashMap::from([("engineering".to_string(), 1_800_000)]),
            ..Default::default()
        });

        let overlay = ConfigOverlay {
            execution: Some(ExecutionOverlay {
                timeouts: Some(TimeoutSection {
                    agents: HashMap::from([("backend".to_string(), 1_200_000)]),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let merged = base.overlay(overlay);
        let timeouts = merged.execution.timeouts.unwrap();
        assert_eq!(timeouts.global, Some(1_500_000));
        assert_eq!(timeouts.teams.get("engineering"), Some(&1_800_000));
        assert_eq!(timeouts.agents.get("backend"), Some(&1_200_000));
    }

    #[test]
    fn test_overlay_replaces_provider_entry() {
        let mut base = AppConfig::default();
        base.providers
            .insert("claude".to_string(), provider(true, 1, 5000, "claude"));

        let mut overlay = ConfigOverlay::default();
        overlay
            .providers
            .insert("claude".to_string(), provider(false, 2, 8000, "claude"));

        let merged = base.overlay(overlay);
        let entry = merged.providers.get("claude").unwrap();
        assert!(!entry.enabled);
        assert_eq!(entry.priority, 2);
        assert_eq!(entry.timeout, 8000);
    }
}
