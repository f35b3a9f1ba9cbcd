//! Execution context assembly.
//!
//! `ContextBuilder` turns an agent identifier and a task into an immutable
//! [`ExecutionContext`]: resolved profile, selected abilities text, chosen
//! provider, resolved paths, injected memory, optional session, and
//! delegation metadata for agents that may orchestrate others.

use crate::ability::AbilityStore;
use crate::memory::{MemoryEntry, MemoryStore};
use crate::profile::{AgentProfile, ProfileError, ProfileStore, SelectionPolicy};
use crate::provider::{Provider, ProviderError, ProviderRouter};
use crate::session::{Session, SessionManager};
use crate::team::TeamStore;
use crate::workspace::{PathError, PathResolver};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Default number of memory entries injected per task
pub const DEFAULT_MEMORY_LIMIT: usize = 5;

/// Immutable context for one agent execution
#[derive(Clone)]
pub struct ExecutionContext {
    pub agent: Arc<AgentProfile>,
    pub task: String,
    /// Prior memory entries relevant to the task; empty on memory failure
    pub memory: Vec<MemoryEntry>,
    pub project_dir: PathBuf,
    /// The process working directory, the one path allowed outside the
    /// project boundary
    pub working_dir: PathBuf,
    pub agent_workspace: PathBuf,
    pub provider: Arc<dyn Provider>,
    /// Composed abilities text; empty when no ability resolved
    pub abilities: String,
    pub created_at: DateTime<Utc>,
    pub orchestration: Option<OrchestrationMetadata>,
    pub session: Option<Session>,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("agent", &self.agent.name)
            .field("task", &self.task)
            .field("provider", &self.provider.name())
            .field("agent_workspace", &self.agent_workspace)
            .field("session", &self.session.as_ref().map(|s| s.id))
            .finish_non_exhaustive()
    }
}

/// Delegation metadata attached for agents allowed to orchestrate
#[derive(Debug, Clone)]
pub struct OrchestrationMetadata {
    /// Whitelisted peers that actually exist in the profile store
    pub available_delegates: Vec<String>,
    /// Session-scoped when a session is attached, persistent otherwise
    pub shared_workspace: PathBuf,
    /// Agents that delegated down to this execution, oldest first
    pub delegation_chain: Vec<String>,
}

/// Options influencing context assembly
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    /// Attach this session when it exists; never creates one
    pub session_id: Option<Uuid>,
    pub delegation_chain: Vec<String>,
    pub skip_memory: bool,
    /// Runtime provider override, consulted before the profile preference
    pub provider_override: Option<String>,
    pub memory_limit: Option<usize>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ContextError {
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Path(#[from] PathError),
}

impl ContextError {
    /// Stable numeric code of the underlying kind
    pub fn code(&self) -> u16 {
        match self {
            ContextError::Profile(e) => e.code(),
            ContextError::Provider(e) => e.code(),
            ContextError::Path(e) => e.code(),
        }
    }
}

/// Builds [`ExecutionContext`] values from injected capabilities
pub struct ContextBuilder {
    profiles: Arc<ProfileStore>,
    abilities: Arc<AbilityStore>,
    teams: Arc<TeamStore>,
    router: ProviderRouter,
    resolver: PathResolver,
    sessions: Arc<SessionManager>,
    memory: Arc<dyn MemoryStore>,
}

impl ContextBuilder {
    pub fn new(
        profiles: Arc<ProfileStore>,
        abilities: Arc<AbilityStore>,
        teams: Arc<TeamStore>,
        router: ProviderRouter,
        resolver: PathResolver,
        sessions: Arc<SessionManager>,
        memory: Arc<dyn MemoryStore>,
    ) -> Self {
        Self {
            profiles,
            abilities,
            teams,
            router,
            resolver,
            sessions,
            memory,
        }
    }

    pub fn profiles(&self) -> &Arc<ProfileStore> {
        &self.profiles
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn memory(&self) -> &Arc<dyn MemoryStore> {
        &self.memory
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Assemble the execution context for one agent and task
    pub async fn create_context(
        &self,
        agent_name: &str,
        task: &str,
        options: &ContextOptions,
    ) -> Result<ExecutionContext, ContextError> {
        let profile = self.profiles.resolve(agent_name).await?;

        let selected = select_abilities(&profile, task);
        let abilities = self.abilities.abilities_text(&selected).await;

        let preference = match options.provider_override {
            Some(ref name) => Some(name.clone()),
            None => self.provider_preference(&profile).await,
        };
        let provider = self.router.select_provider(preference.as_deref()).await?;

        let project_dir = self.resolver.project_root().to_path_buf();
        let working_dir = std::env::current_dir().unwrap_or_else(|_| project_dir.clone());
        let agent_workspace = self.resolver.ensure_agent_workspace(&profile.name)?;

        let session = options
            .session_id
            .and_then(|id| self.sessions.get_session(id));

        let orchestration = if profile.can_delegate() {
            Some(
                self.build_orchestration(&profile, session.as_ref(), options)
                    .await?,
            )
        } else {
            None
        };

        let memory = if options.skip_memory {
            Vec::new()
        } else {
            let limit = options.memory_limit.unwrap_or(DEFAULT_MEMORY_LIMIT);
            match self.memory.search(task, limit).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Memory query failed; continuing without memory: {}", e);
                    Vec::new()
                }
            }
        };

        debug!(
            agent = %profile.name,
            provider = %provider.name(),
            abilities = selected.len(),
            memory = memory.len(),
            "Built execution context"
        );

        Ok(ExecutionContext {
            agent: profile,
            task: task.to_string(),
            memory,
            project_dir,
            working_dir,
            agent_workspace,
            provider,
            abilities,
            created_at: Utc::now(),
            orchestration,
            session,
        })
    }

    /// The provider preference chain: profile first, then the agent's team
    async fn provider_preference(&self, profile: &AgentProfile) -> Option<String> {
        if let Some(ref preference) = profile.provider_preference {
            return Some(preference.clone());
        }
        let team_name = profile.team.as_ref()?;
        match self.teams.get(team_name).await {
            Ok(team) => Some(team.provider.primary.clone()),
            Err(e) => {
                warn!("Failed to load team {} for provider preference: {}", team_name, e);
                None
            }
        }
    }

    async fn build_orchestration(
        &self,
        profile: &AgentProfile,
        session: Option<&Session>,
        options: &ContextOptions,
    ) -> Result<OrchestrationMetadata, ContextError> {
        let whitelist = profile
            .orchestration
            .as_ref()
            .map(|o| o.can_delegate_to.clone())
            .unwrap_or_default();

        // Only whitelisted peers that actually exist can be delegated to.
        let peers = self.profiles.list().await;
        let available_delegates: Vec<String> = whitelist
            .into_iter()
            .filter(|name| name != &profile.name && peers.iter().any(|p| p == name))
            .collect();

        let shared_workspace = match session {
            Some(session) => self
                .resolver
                .ensure_session_workspace(&session.id.to_string())?,
            None => self.resolver.ensure_persistent_workspace()?,
        };

        Ok(OrchestrationMetadata {
            available_delegates,
            shared_workspace,
            delegation_chain: options.delegation_chain.clone(),
        })
    }
}

/// Apply the profile's ability-selection policy to a task.
///
/// `loadAll` (or no policy) selects every declared ability. The selective
/// policy takes the core set plus every ability keyed by a case-insensitive
/// substring match of the task, de-duplicated in declaration order. An empty
/// selection falls back to the first two declared abilities.
pub fn select_abilities(profile: &AgentProfile, task: &str) -> Vec<String> {
    match profile.selection_policy() {
        SelectionPolicy::LoadAll => profile.abilities.clone(),
        SelectionPolicy::Selective { core, task_based } => {
            let task_lowered = task.to_lowercase();
            let mut selected = core;
            for (keyword, ability_names) in &task_based {
                if task_lowered.contains(&keyword.to_lowercase()) {
                    selected.extend(ability_names.iter().cloned());
                }
            }

            let mut seen = std::collections::HashSet::new();
            selected.retain(|name| seen.insert(name.clone()));

            if selected.is_empty() {
                profile.abilities.iter().take(2).cloned().collect()
            } else {
                selected
            }
        }
    }
}
