//! Team configuration store.
//!
//! Teams group agents behind shared provider preferences and abilities.
//! The store mirrors the profile store's shape (directory of YAML files with
//! a TTL cache) with a longer TTL and a validator that recognizes the closed
//! set of provider identifiers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// How long a parsed team config stays valid in the cache
pub const TEAM_CACHE_TTL: Duration = Duration::from_secs(600);

/// Recognized provider identifiers and their canonical forms. Aliases map to
/// the same canonical identifier, so `claude` and `claude-code` are
/// interchangeable in team files.
const PROVIDER_IDENTIFIERS: &[(&str, &str)] = &[
    ("claude", "claude"),
    ("claude-code", "claude"),
    ("gemini", "gemini"),
    ("gemini-cli", "gemini"),
    ("codex", "codex"),
    ("openai", "codex"),
];

/// Resolve a provider identifier to its canonical form, if recognized
pub fn canonical_provider(identifier: &str) -> Option<&'static str> {
    PROVIDER_IDENTIFIERS
        .iter()
        .find(|(alias, _)| *alias == identifier)
        .map(|(_, canonical)| *canonical)
}

/// Team configuration record loaded from YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamConfig {
    pub name: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub description: String,
    pub provider: TeamProviderPreference,
    #[serde(rename = "sharedAbilities", default)]
    pub shared_abilities: Option<Vec<String>>,
    /// Orchestration defaults applied to member agents that declare none
    #[serde(default)]
    pub orchestration: Option<crate::profile::OrchestrationConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamProviderPreference {
    pub primary: String,
    #[serde(default)]
    pub fallback: Option<String>,
    #[serde(rename = "fallbackChain", default)]
    pub fallback_chain: Option<Vec<String>>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TeamError {
    #[error("team not found: {name}")]
    NotFound { name: String },
    #[error("team {name} failed validation: {}", problems.join("; "))]
    ValidationFailed { name: String, problems: Vec<String> },
    #[error("failed to read team {name}: {reason}")]
    Io { name: String, reason: String },
}

impl TeamError {
    /// Stable numeric code grouped by kind
    pub fn code(&self) -> u16 {
        match self {
            TeamError::NotFound { .. } => 2201,
            TeamError::ValidationFailed { .. } => 2202,
            TeamError::Io { .. } => 2203,
        }
    }
}

impl TeamConfig {
    /// Validate required fields and provider identifiers
    pub fn validate(&self) -> Result<(), TeamError> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push("name: must be non-empty".to_string());
        }
        if canonical_provider(&self.provider.primary).is_none() {
            problems.push(format!(
                "provider.primary: unrecognized provider {:?}",
                self.provider.primary
            ));
        }
        if let Some(ref fallback) = self.provider.fallback
            && canonical_provider(fallback).is_none()
        {
            problems.push(format!(
                "provider.fallback: unrecognized provider {:?}",
                fallback
            ));
        }
        if let Some(ref chain) = self.provider.fallback_chain {
            for (i, identifier) in chain.iter().enumerate() {
                if canonical_provider(identifier).is_none() {
                    problems.push(format!(
                        "provider.fallbackChain[{}]: unrecognized provider {:?}",
                        i, identifier
                    ));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(TeamError::ValidationFailed {
                name: self.name.clone(),
                problems,
            })
        }
    }
}

#[derive(Debug, Clone)]
struct CachedTeam {
    team: Arc<TeamConfig>,
    loaded_at: Instant,
}

/// Loads and caches team configuration records
#[derive(Debug)]
pub struct TeamStore {
    teams_dir: PathBuf,
    cache: RwLock<HashMap<String, CachedTeam>>,
    ttl: Duration,
}

impl TeamStore {
    pub fn new(teams_dir: PathBuf) -> Self {
        Self {
            teams_dir,
            cache: RwLock::new(HashMap::new()),
            ttl: TEAM_CACHE_TTL,
        }
    }

    /// Load a team by name
    pub async fn get(&self, name: &str) -> Result<Arc<TeamConfig>, TeamError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(name)
                && cached.loaded_at.elapsed() < self.ttl
            {
                debug!("Team cache hit: {}", name);
                return Ok(Arc::clone(&cached.team));
            }
        }

        let team = Arc::new(self.load_from_disk(name)?);
        self.cache.write().await.insert(
            name.to_string(),
            CachedTeam {
                team: Arc::clone(&team),
                loaded_at: Instant::now(),
            },
        );
        Ok(team)
    }

    /// Drop every cached team
    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }

    fn load_from_disk(&self, name: &str) -> Result<TeamConfig, TeamError> {
        let path = ["yaml", "yml"]
            .iter()
            .map(|ext| self.teams_dir.join(format!("{}.{}", name, ext)))
            .find(|p| p.is_file())
            .ok_or_else(|| TeamError::NotFound {
                name: name.to_string(),
            })?;

        let content = std::fs::read_to_string(&path).map_err(|e| TeamError::Io {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        let team: TeamConfig =
            serde_yaml::from_str(&content).map_err(|e| TeamError::ValidationFailed {
                name: name.to_string(),
                problems: vec![e.to_string()],
            })?;
        team.validate()?;
        debug!("Loaded team {} from {}", name, path.display());
        Ok(team)
    }
}
