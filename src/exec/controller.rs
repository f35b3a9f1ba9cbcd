//! Execution controller facade.
//!
//! Binds the context builder, stage executor, delegation policy, and
//! parallel executor behind three entry points: run one agent (staged or
//! not), run a dependency DAG of agents, and delegate a sub-task. Every
//! provider call goes through the timeout, retry, circuit-breaker, and
//! response-cache pipeline owned by the adapter.

use crate::context::{ContextBuilder, ContextError, ContextOptions, ExecutionContext};
use crate::events::{EventSink, ExecutionEvent};
use crate::exec::compose_system_prompt;
use crate::exec::delegation::{
    DelegationFailureReason, DelegationOutputs, DelegationRequest, DelegationResult,
    DelegationStatus, check_preconditions,
};
use crate::exec::parallel::{DagError, ParallelAgent, ParallelExecutor, ParallelRunResult};
use crate::exec::stage::{MultiStageResult, StageExecutor, StageRunOptions};
use crate::memory::MemoryEntry;
use crate::provider::{ProviderError, ProviderRequest, ProviderResponse};
use crate::timeout::{TimeoutMonitor, TimeoutResolver};
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Options for one controller run
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    pub session_id: Option<Uuid>,
    pub delegation_chain: Vec<String>,
    /// Runtime timeout override in milliseconds; wins over every configured
    /// layer
    pub runtime_timeout_ms: Option<u64>,
    pub continue_on_failure: bool,
    pub skip_memory: bool,
    /// Persist agent outputs into the memory store
    pub persist_memory: bool,
    pub provider_override: Option<String>,
}

/// Result of a single-agent run
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub response: ProviderResponse,
    pub duration_ms: u64,
    pub context: ExecutionContext,
    /// Present when the profile declared a staged workflow
    pub stages: Option<MultiStageResult>,
}

impl ExecutionResult {
    /// Whether the run (including every stage) succeeded
    pub fn success(&self) -> bool {
        self.stages.as_ref().map(|s| s.success).unwrap_or(true)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Dag(#[from] DagError),
}

impl ExecutionError {
    /// Stable numeric code of the underlying kind
    pub fn code(&self) -> u16 {
        match self {
            ExecutionError::Context(e) => e.code(),
            ExecutionError::Provider(e) => e.code(),
            ExecutionError::Dag(e) => e.code(),
        }
    }

    /// Build the user-facing report: kind, code, message, and suggestions
    pub fn report(&self) -> ErrorReport {
        let (kind, suggestions) = match self {
            ExecutionError::Context(ContextError::Profile(_)) => (
                "profile",
                vec![
                    "Check .automatosx/agents/ for the profile file".to_string(),
                    "List available agents to verify the name".to_string(),
                ],
            ),
            ExecutionError::Context(ContextError::Path(_)) => (
                "path",
                vec!["Paths must stay inside the project root".to_string()],
            ),
            ExecutionError::Context(ContextError::Provider(_))
            | ExecutionError::Provider(_) => (
                "provider",
                vec![
                    "Verify the provider CLI is installed and on PATH".to_string(),
                    "Check provider enablement in the configuration".to_string(),
                ],
            ),
            ExecutionError::Dag(_) => (
                "dag",
                vec!["Review the declared agent dependencies".to_string()],
            ),
        };
        ErrorReport {
            kind: kind.to_string(),
            code: self.code(),
            message: self.to_string(),
            suggestions,
        }
    }
}

/// Surfaced error shape handed to the external layer
#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorReport {
    pub kind: String,
    pub code: u16,
    pub message: String,
    pub suggestions: Vec<String>,
}

/// The facade the external CLI/MCP layer calls
pub struct ExecutionController {
    context_builder: Arc<ContextBuilder>,
    timeout_resolver: TimeoutResolver,
    stage_executor: StageExecutor,
    sink: Arc<dyn EventSink>,
    max_concurrent_agents: u32,
}

impl ExecutionController {
    pub fn new(
        context_builder: Arc<ContextBuilder>,
        timeout_resolver: TimeoutResolver,
        sink: Arc<dyn EventSink>,
        max_concurrent_agents: u32,
    ) -> Self {
        let stage_executor = StageExecutor::new(
            Arc::clone(&sink),
            Arc::clone(context_builder.memory()),
        );
        Self {
            context_builder,
            timeout_resolver,
            stage_executor,
            sink,
            max_concurrent_agents,
        }
    }

    pub fn context_builder(&self) -> &Arc<ContextBuilder> {
        &self.context_builder
    }

    /// Run one agent on a task: staged when the profile declares stages,
    /// a single provider call otherwise
    pub async fn run_agent(
        &self,
        agent: &str,
        task: &str,
        options: &ExecutionOptions,
    ) -> Result<ExecutionResult, ExecutionError> {
        let context_options = ContextOptions {
            session_id: options.session_id,
            delegation_chain: options.delegation_chain.clone(),
            skip_memory: options.skip_memory,
            provider_override: options.provider_override.clone(),
            memory_limit: None,
        };
        let context = self
            .context_builder
            .create_context(agent, task, &context_options)
            .await?;

        self.sink.emit(ExecutionEvent::ExecutionStarted {
            agent: context.agent.name.clone(),
            task: task.to_string(),
        });

        if let Some(ref session) = context.session
            && let Err(e) = self
                .context_builder
                .sessions()
                .add_agent(session.id, &context.agent.name)
        {
            warn!("Could not join session {}: {}", session.id, e);
        }

        let resolved = self.timeout_resolver.resolve(
            Some(&context.agent.name),
            context.agent.team.as_deref(),
            options.runtime_timeout_ms,
        );
        let monitor = TimeoutMonitor::start(
            resolved,
            context.agent.name.clone(),
            task.to_string(),
            Arc::clone(&self.sink),
        );

        let started = Instant::now();
        let outcome = match context.agent.stages.clone() {
            Some(stages) => {
                let stage_options = StageRunOptions {
                    continue_on_failure: options.continue_on_failure,
                    persist_memory: options.persist_memory,
                    default_timeout: resolved.as_duration(),
                };
                let staged = self
                    .stage_executor
                    .execute(&context, &stages, &stage_options)
                    .await;
                Ok(ExecutionResult {
                    response: ProviderResponse {
                        request_id: Uuid::new_v4(),
                        content: staged.final_output.clone(),
                        model: context
                            .agent
                            .model
                            .clone()
                            .unwrap_or_else(|| context.provider.name().to_string()),
                        token_usage: crate::provider::TokenUsage {
                            prompt_tokens: 0,
                            completion_tokens: 0,
                            total_tokens: staged
                                .stage_results
                                .iter()
                                .map(|r| r.tokens_used)
                                .sum(),
                        },
                        latency_ms: staged.total_duration_ms,
                        finish_reason: crate::provider::FinishReason::Stop,
                    },
                    duration_ms: staged.total_duration_ms,
                    context: context.clone(),
                    stages: Some(staged),
                })
            }
            None => {
                let request = ProviderRequest {
                    id: Uuid::new_v4(),
                    prompt: task.to_string(),
                    system_prompt: Some(compose_system_prompt(&context)),
                    model: context.agent.model.clone(),
                    temperature: context.agent.temperature,
                    max_tokens: context.agent.max_tokens,
                    top_p: None,
                };
                match context.provider.execute(request, resolved.as_duration()).await {
                    Ok(response) => {
                        if options.persist_memory {
                            self.persist_task_memory(&context, &response.content).await;
                        }
                        Ok(ExecutionResult {
                            duration_ms: started.elapsed().as_millis() as u64,
                            context: context.clone(),
                            response,
                            stages: None,
                        })
                    }
                    Err(error) => Err(ExecutionError::Provider(error)),
                }
            }
        };
        monitor.stop();

        let duration_ms = started.elapsed().as_millis() as u64;
        self.sink.emit(ExecutionEvent::ExecutionCompleted {
            agent: context.agent.name.clone(),
            success: outcome.as_ref().map(|r| r.success()).unwrap_or(false),
            duration_ms,
        });

        outcome
    }

    /// Run a DAG of agents on a common task, scheduled by dependency level
    pub async fn run_parallel(
        &self,
        agents: Vec<ParallelAgent>,
        task: &str,
        options: &ExecutionOptions,
    ) -> Result<ParallelRunResult, ExecutionError> {
        let executor = ParallelExecutor::new(
            Arc::clone(&self.sink),
            self.max_concurrent_agents,
            options.continue_on_failure,
        );

        let result = executor
            .execute(&agents, |name| {
                Box::pin(async move {
                    match self.run_agent(&name, task, options).await {
                        Ok(result) if result.success() => Ok(result.response.content),
                        Ok(result) => Err(result
                            .stages
                            .as_ref()
                            .and_then(|s| s.failed_stage)
                            .map(|i| format!("stage {} failed", i))
                            .unwrap_or_else(|| "execution failed".to_string())),
                        Err(error) => Err(error.to_string()),
                    }
                })
            })
            .await?;
        Ok(result)
    }

    /// Delegate a sub-task from one agent to another.
    ///
    /// Every precondition is verified before the child run starts; a
    /// violated precondition yields a failure result without touching any
    /// provider.
    pub async fn delegate(&self, request: DelegationRequest) -> DelegationResult {
        let delegation_id = Uuid::new_v4();
        let started_at = Utc::now();
        let timer = Instant::now();

        self.sink.emit(ExecutionEvent::DelegationStarted {
            delegation_id: delegation_id.to_string(),
            from_agent: request.from_agent.clone(),
            to_agent: request.to_agent.clone(),
        });

        let result = self
            .delegate_inner(&request, delegation_id, started_at, timer)
            .await;

        self.sink.emit(ExecutionEvent::DelegationCompleted {
            delegation_id: delegation_id.to_string(),
            from_agent: request.from_agent.clone(),
            to_agent: request.to_agent.clone(),
            success: result.status == DelegationStatus::Success,
        });
        result
    }

    async fn delegate_inner(
        &self,
        request: &DelegationRequest,
        delegation_id: Uuid,
        started_at: chrono::DateTime<Utc>,
        timer: Instant,
    ) -> DelegationResult {
        let profiles = self.context_builder.profiles();

        let from_profile = match profiles.resolve(&request.from_agent).await {
            Ok(profile) => profile,
            Err(_) => {
                return DelegationResult::failure(
                    request,
                    delegation_id,
                    started_at,
                    DelegationFailureReason::NotFound,
                );
            }
        };
        if profiles.resolve(&request.to_agent).await.is_err() {
            return DelegationResult::failure(
                request,
                delegation_id,
                started_at,
                DelegationFailureReason::NotFound,
            );
        }
        if let Err(reason) = check_preconditions(&from_profile, request) {
            return DelegationResult::failure(request, delegation_id, started_at, reason);
        }

        let mut chain = request.delegation_chain.clone();
        chain.push(request.from_agent.clone());
        let child_options = ExecutionOptions {
            session_id: request.session_id,
            delegation_chain: chain,
            runtime_timeout_ms: request.timeout_ms,
            continue_on_failure: false,
            skip_memory: false,
            persist_memory: false,
            provider_override: None,
        };

        match self
            .run_agent(&request.to_agent, &request.task, &child_options)
            .await
        {
            Ok(result) => {
                let workspace = result.context.agent_workspace.clone();
                let files = collect_workspace_files(&workspace);
                let ended_at = Utc::now();
                info!(
                    "Delegation {} -> {} completed in {} ms",
                    request.from_agent,
                    request.to_agent,
                    timer.elapsed().as_millis()
                );
                DelegationResult {
                    delegation_id,
                    from_agent: request.from_agent.clone(),
                    to_agent: request.to_agent.clone(),
                    status: DelegationStatus::Success,
                    reason: None,
                    outputs: Some(DelegationOutputs {
                        response: result.response.content,
                        files,
                        workspace,
                    }),
                    duration_ms: timer.elapsed().as_millis() as u64,
                    started_at,
                    ended_at,
                }
            }
            Err(ExecutionError::Provider(ProviderError::Timeout { .. })) => {
                DelegationResult::failure(
                    request,
                    delegation_id,
                    started_at,
                    DelegationFailureReason::Timeout,
                )
            }
            Err(error) => {
                warn!(
                    "Delegated run {} -> {} failed: {}",
                    request.from_agent, request.to_agent, error
                );
                DelegationResult::failure(
                    request,
                    delegation_id,
                    started_at,
                    DelegationFailureReason::ExecutionFailed,
                )
            }
        }
    }

    async fn persist_task_memory(&self, context: &ExecutionContext, output: &str) {
        let metadata = HashMap::from([
            ("type".to_string(), "task".to_string()),
            ("source".to_string(), context.agent.name.clone()),
        ]);
        if let Err(e) = self
            .context_builder
            .memory()
            .add(MemoryEntry::new(output.to_string(), metadata))
            .await
        {
            warn!("Failed to persist task output to memory: {}", e);
        }
    }
}

/// Files present under a workspace directory, relative order unspecified
fn collect_workspace_files(workspace: &Path) -> Vec<PathBuf> {
    fn walk(dir: &Path, files: &mut Vec<PathBuf>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(&path, files);
            } else {
                files.push(path);
            }
        }
    }

    let mut files = Vec::new();
    walk(workspace, &mut files);
    files
}
