//! # High-Level System Integration
//!
//! Combines the stores, provider layer, session manager, and execution
//! engine into one orchestrator, wired from the typed application
//! configuration.
//!
//! ## Example Usage
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
//!         .run_agent("backend", "Add an endpoint", &ExecutionOptions::default())
//!         .await?;
//!     println!("{}", result.response.content);
//!     Ok(())
//! }
//! ```

use crate::ability::AbilityStore;
use crate::config::AppConfig;
use crate::context::ContextBuilder;
use crate::env;
use crate::events::{EventSink, TracingSink};
use crate::exec::ExecutionController;
use crate::memory::{InMemoryMemoryStore, MemoryStore};
use crate::profile::ProfileStore;
use crate::provider::{
    CacheConfig, CliAdapter, Provider, ProviderRouter, ResponseCache, RetryConfig,
};
use crate::session::SessionManager;
use crate::team::TeamStore;
use crate::timeout::TimeoutResolver;
use crate::workspace::PathResolver;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// The assembled system: stores, providers, sessions, and the execution
/// controller
pub struct Orchestrator {
    controller: ExecutionController,
    sessions: Arc<SessionManager>,
    cache: Option<Arc<ResponseCache>>,
    profiler_enabled: bool,
}

/// Optional capability overrides for [`Orchestrator::initialize`]
#[derive(Default)]
pub struct OrchestratorOverrides {
    /// Replace the in-memory fallback with a real memory store
    pub memory: Option<Arc<dyn MemoryStore>>,
    /// Attach a custom event sink instead of the tracing sink
    pub sink: Option<Arc<dyn EventSink>>,
    /// Enable the response cache
    pub cache: Option<CacheConfig>,
    /// Replace the CLI adapters entirely (used by tests and mock setups)
    pub providers: Option<Vec<Arc<dyn Provider>>>,
}

impl Orchestrator {
    /// Wire the full system from the application configuration, rooted at
    /// the project containing `start_dir`
    pub fn initialize(config: AppConfig, start_dir: &Path) -> Result<Self> {
        Self::initialize_with(config, start_dir, OrchestratorOverrides::default())
    }

    /// Wire the system with explicit capability overrides
    pub fn initialize_with(
        config: AppConfig,
        start_dir: &Path,
        overrides: OrchestratorOverrides,
    ) -> Result<Self> {
        config.validate().context("invalid configuration")?;
        let resolver = PathResolver::discover(start_dir).context("failed to resolve project root")?;
        let project_root = resolver.project_root().to_path_buf();
        info!("Initializing orchestrator at {}", project_root.display());

        // Profiling itself lives in the host; the engine only accepts the
        // flag and surfaces it to the injected telemetry sink.
        let profiler_enabled = env::profiler_enabled_from_env();
        if profiler_enabled {
            info!("CPU/memory profiling requested via {}", env::PROFILER_ENV_VAR);
        }

        let sink = overrides
            .sink
            .unwrap_or_else(|| Arc::new(TracingSink) as Arc<dyn EventSink>);

        let cache = overrides.cache.map(|mut cache_config| {
            if cache_config.path.is_none() {
                cache_config.path = Some(env::response_cache_file_path(&project_root));
            }
            Arc::new(ResponseCache::open(cache_config))
        });

        let retry = config
            .execution
            .retry
            .as_ref()
            .map(RetryConfig::from)
            .unwrap_or_default();

        let providers: Vec<Arc<dyn Provider>> = match overrides.providers {
            Some(providers) => providers,
            None => config
                .providers
                .iter()
                .filter(|(_, section)| section.enabled)
                .map(|(name, section)| {
                    let mut adapter = CliAdapter::new(name.clone(), section.clone())
                        .with_retry(retry.clone())
                        .with_event_sink(Arc::clone(&sink));
                    if let Some(ref cache) = cache {
                        adapter = adapter.with_cache(Arc::clone(cache));
                    }
                    Arc::new(adapter) as Arc<dyn Provider>
                })
                .collect(),
        };

        let sessions = Arc::new(SessionManager::new());
        let memory = overrides
            .memory
            .unwrap_or_else(|| Arc::new(InMemoryMemoryStore::new()) as Arc<dyn MemoryStore>);

        let context_builder = Arc::new(ContextBuilder::new(
            Arc::new(ProfileStore::new(env::agents_dir_path(&project_root), None)),
            Arc::new(AbilityStore::new(env::abilities_dir_path(&project_root))),
            Arc::new(TeamStore::new(env::teams_dir_path(&project_root))),
            ProviderRouter::new(providers),
            resolver,
            Arc::clone(&sessions),
            memory,
        ));

        let timeout_resolver = TimeoutResolver::new(
            config.execution.timeouts.clone().unwrap_or_default(),
            config.execution.default_timeout,
        );

        let controller = ExecutionController::new(
            context_builder,
            timeout_resolver,
            sink,
            config.execution.max_concurrent_agents,
        );

        Ok(Self {
            controller,
            sessions,
            cache,
            profiler_enabled,
        })
    }

    pub fn controller(&self) -> &ExecutionController {
        &self.controller
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn response_cache(&self) -> Option<&Arc<ResponseCache>> {
        self.cache.as_ref()
    }

    /// Whether the host asked for CPU/memory sampling via the profiler
    /// environment flag. The attached profiler consults this; the engine
    /// never samples on its own.
    pub fn profiler_enabled(&self) -> bool {
        self.profiler_enabled
    }
}
