use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Maximum size of a profile file on disk
pub const MAX_PROFILE_FILE_SIZE: u64 = 100 * 1024;

/// Valid charset for profile and ability names
pub fn name_pattern() -> &'static regex::Regex {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| regex::Regex::new(r"^[A-Za-z0-9_-]+$").expect("static pattern"))
}

/// A named, configurable agent role loaded from a YAML profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Unique identifier; defaults to the profile filename
    #[serde(default)]
    pub name: String,
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
    pub role: String,
    pub description: String,
    #[serde(rename = "systemPrompt")]
    pub system_prompt: String,
    /// Ability names composed into the agent's prompt, in declared order
    #[serde(default)]
    pub abilities: Vec<String>,
    /// Ordered staged workflow; absent for single-shot agents
    #[serde(default)]
    pub stages: Option<Vec<Stage>>,
    #[serde(default)]
    pub personality: Option<PersonalityConfig>,
    #[serde(rename = "thinking_patterns", default)]
    pub thinking_patterns: Option<Vec<String>>,
    /// Preferred provider identifier, consulted during provider selection
    #[serde(rename = "provider", default)]
    pub provider_preference: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Sampling temperature within [0, 1]
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(rename = "maxTokens", default)]
    pub max_tokens: Option<u64>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, serde_yaml::Value>>,
    #[serde(default)]
    pub orchestration: Option<OrchestrationConfig>,
    #[serde(rename = "abilitySelection", default)]
    pub ability_selection: Option<AbilitySelection>,
    /// Team this agent belongs to, used for team-level timeout and provider
    /// preferences
    #[serde(default)]
    pub team: Option<String>,
    /// Names of agents this one depends on in a DAG run
    #[serde(default)]
    pub dependencies: Option<Vec<String>>,
    /// Whether this agent may run concurrently with its level peers
    #[serde(default)]
    pub parallel: Option<bool>,
}

/// One step of a multi-step workflow within a single agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub description: String,
    #[serde(rename = "key_questions", default)]
    pub key_questions: Option<Vec<String>>,
    #[serde(rename = "outputs", default)]
    pub expected_outputs: Option<Vec<String>>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub checkpoint: Option<bool>,
    /// Stage-level timeout override in milliseconds
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(rename = "maxRetries", default)]
    pub max_retries: Option<u32>,
}

/// Optional personality coloring carried into the system prompt
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PersonalityConfig {
    #[serde(default)]
    pub traits: Option<Vec<String>>,
    #[serde(default)]
    pub catchphrase: Option<String>,
    #[serde(rename = "communication_style", default)]
    pub communication_style: Option<String>,
    #[serde(rename = "decision_making", default)]
    pub decision_making: Option<String>,
}

/// Delegation and workspace-sharing policy for an agent
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    #[serde(rename = "canDelegate", default)]
    pub can_delegate: bool,
    #[serde(rename = "canDelegateTo", default)]
    pub can_delegate_to: Vec<String>,
    #[serde(rename = "maxDelegationDepth", default = "default_max_delegation_depth")]
    pub max_delegation_depth: u32,
    #[serde(rename = "canReadWorkspaces", default)]
    pub can_read_workspaces: Vec<String>,
    #[serde(rename = "canWriteToShared", default)]
    pub can_write_to_shared: bool,
}

pub fn default_max_delegation_depth() -> u32 {
    3
}

/// Raw ability-selection section as written in YAML
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AbilitySelection {
    #[serde(rename = "loadAll", default)]
    pub load_all: Option<bool>,
    #[serde(default)]
    pub core: Option<Vec<String>>,
    #[serde(rename = "taskBased", default)]
    pub task_based: Option<HashMap<String, Vec<String>>>,
}

/// Normalized ability-selection policy
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionPolicy {
    /// Use every declared ability
    LoadAll,
    /// Use the core set plus abilities keyed by task keywords
    Selective {
        core: Vec<String>,
        task_based: HashMap<String, Vec<String>>,
    },
}

impl AbilitySelection {
    /// Collapse the raw section into a policy. An explicit `loadAll: true`
    /// or a section with neither core nor keyword entries selects everything.
    pub fn policy(&self) -> SelectionPolicy {
        if self.load_all.unwrap_or(false)
            || (self.core.is_none() && self.task_based.is_none())
        {
            SelectionPolicy::LoadAll
        } else {
            SelectionPolicy::Selective {
                core: self.core.clone().unwrap_or_default(),
                task_based: self.task_based.clone().unwrap_or_default(),
            }
        }
    }
}

/// Profile loading and validation failures. All variants are non-retryable.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProfileError {
    #[error("agent profile not found: {name}")]
    NotFound { name: String },
    #[error("agent profile {name} failed validation: {}", problems.join("; "))]
    ValidationFailed { name: String, problems: Vec<String> },
    #[error("agent profile {name} is too large: {size} bytes > {MAX_PROFILE_FILE_SIZE}")]
    TooLarge { name: String, size: u64 },
    #[error("invalid agent name: {name}")]
    InvalidName { name: String },
    #[error("failed to read profile {name}: {reason}")]
    Io { name: String, reason: String },
}

impl ProfileError {
    /// Stable numeric code grouped by kind
    pub fn code(&self) -> u16 {
        match self {
            ProfileError::NotFound { .. } => 2001,
            ProfileError::ValidationFailed { .. } => 2002,
            ProfileError::TooLarge { .. } => 2003,
            ProfileError::InvalidName { .. } => 2004,
            ProfileError::Io { .. } => 2005,
        }
    }
}

impl AgentProfile {
    /// Validate required fields, types, and numeric ranges
    pub fn validate(&self) -> Result<(), ProfileError> {
        let mut problems = Vec::new();

        if !name_pattern().is_match(&self.name) {
            problems.push(format!("name: must match [A-Za-z0-9_-]+, got {:?}", self.name));
        }
        if self.role.trim().is_empty() {
            problems.push("role: must be non-empty".to_string());
        }
        if self.description.trim().is_empty() {
            problems.push("description: must be non-empty".to_string());
        }
        if self.system_prompt.trim().is_empty() {
            problems.push("systemPrompt: must be non-empty".to_string());
        }
        if let Some(temperature) = self.temperature
            && !(0.0..=1.0).contains(&temperature)
        {
            problems.push(format!(
                "temperature: must be within [0, 1], got {}",
                temperature
            ));
        }
        if let Some(max_tokens) = self.max_tokens
            && max_tokens == 0
        {
            problems.push("maxTokens: must be positive, got 0".to_string());
        }
        if let Some(ref stages) = self.stages {
            if stages.is_empty() {
                problems.push("stages: must not be empty when declared".to_string());
            }
            let mut seen = std::collections::HashSet::new();
            for stage in stages {
                if stage.name.trim().is_empty() {
                    problems.push("stages: every stage needs a name".to_string());
                }
                if !seen.insert(stage.name.as_str()) {
                    problems.push(format!("stages: duplicate stage name {:?}", stage.name));
                }
                if let Some(temperature) = stage.temperature
                    && !(0.0..=1.0).contains(&temperature)
                {
                    problems.push(format!(
                        "stages.{}.temperature: must be within [0, 1], got {}",
                        stage.name, temperature
                    ));
                }
            }
        }
        if let Some(ref orchestration) = self.orchestration
            && orchestration.can_delegate
            && orchestration.max_delegation_depth == 0
        {
            problems.push("orchestration.maxDelegationDepth: must be positive".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ProfileError::ValidationFailed {
                name: self.name.clone(),
                problems,
            })
        }
    }

    /// Whether this agent is allowed to delegate work to another agent
    pub fn can_delegate(&self) -> bool {
        self.orchestration
            .as_ref()
            .map(|o| o.can_delegate)
            .unwrap_or(false)
    }

    /// The normalized ability-selection policy; omitting the section means
    /// every declared ability is used
    pub fn selection_policy(&self) -> SelectionPolicy {
        self.ability_selection
            .as_ref()
            .map(|s| s.policy())
            .unwrap_or(SelectionPolicy::LoadAll)
    }
}
