//! # AutomatosX
//!
//! A local, developer-side orchestrator that turns natural-language tasks
//! into multi-stage, multi-agent workflows executed by external LLM CLI
//! providers (a `claude`, `gemini`, or `codex` command).
//!
//! ## Architecture Overview
//!
//! The system consists of several key components organized into modules:
//!
//! - **[`profile`]**: Agent profile loading, validation, caching, and
//!   display-name alias resolution
//! - **[`ability`]** / **[`team`]**: Ability briefs and team configuration
//!   stores
//! - **[`provider`]**: External CLI adapters with retry, circuit breaking,
//!   uptime-adaptive availability checks, and a two-tier response cache
//! - **[`context`]**: Immutable execution-context assembly per task
//! - **[`exec`]**: The execution engine — staged workflows, capability-
//!   checked delegation, dependency-DAG scheduling, and the controller
//!   facade
//! - **[`session`]**: Multi-agent session tracking with cap and age sweeps
//! - **[`timeout`]**: Layered timeout resolution and warning monitoring
//! - **[`workspace`]**: Project-root detection and boundary-checked
//!   workspace management
//! - **[`memory`]**: The injected memory capability interface
//! - **[`integration`]**: Wiring everything from the typed configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use automatosx::{AppConfig, ExecutionOptions, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::default();
//!     let orchestrator = Orchestrator::initialize(config, &std::env::current_dir()?)?;
//!
//!     let result = orchestrator
//!         .controller()
//!         .run_agent("backend", "Implement the feature", &ExecutionOptions::default())
//!         .await?;
//!
//!     println!("{}", result.response.content);
//!     Ok(())
//! }
//! ```

/// Ability document store.
pub mod ability;

/// Typed application configuration.
pub mod config;

/// Execution context assembly.
pub mod context;

/// Environment constants and path utilities.
pub mod env;

/// Lifecycle event stream.
pub mod events;

/// The execution engine: stages, delegation, DAG scheduling, controller.
pub mod exec;

/// High-level system wiring.
pub mod integration;

/// Injected memory capability.
pub mod memory;

/// Agent profile system.
pub mod profile;

/// Provider adapters, routing, and caching.
pub mod provider;

/// Multi-agent session tracking.
pub mod session;

/// Team configuration store.
pub mod team;

/// Layered timeout resolution.
pub mod timeout;

/// Path resolution and workspace management.
pub mod workspace;

// Re-export the main configuration types
pub use config::{AppConfig, ConfigError, ConfigOverlay};

// Re-export the main profile types
pub use profile::{AgentProfile, ProfileError, ProfileStore, SelectionPolicy, Stage};

// Re-export the main provider types
pub use provider::{
    CliAdapter, Provider, ProviderError, ProviderRequest, ProviderResponse, ProviderRouter,
    ResponseCache,
};

// Re-export the execution engine surface
pub use exec::{
    DelegationRequest, DelegationResult, ExecutionController, ExecutionError, ExecutionOptions,
    ExecutionResult, MultiStageResult, ParallelAgent, ParallelRunResult,
};

// Re-export context and session types
pub use context::{ContextBuilder, ContextOptions, ExecutionContext};
pub use session::{Session, SessionManager, SessionStatus};

// Re-export system wiring
pub use integration::{Orchestrator, OrchestratorOverrides};

// Re-export the event stream surface
pub use events::{EventSink, ExecutionEvent};

// Re-export the memory capability
pub use memory::{MemoryEntry, MemoryStore};
