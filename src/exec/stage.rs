//! Staged execution for one agent.
//!
//! Profiles declaring an ordered stage list run sequentially; each stage's
//! prompt carries the original task plus the accumulated outputs of prior
//! successful stages. Stage-level model and temperature overrides fall back
//! to profile-level values, then adapter defaults.

use crate::context::ExecutionContext;
use crate::events::{EventSink, ExecutionEvent};
use crate::exec::compose_system_prompt;
use crate::memory::{MemoryEntry, MemoryStore};
use crate::profile::Stage;
use crate::provider::{ProviderError, ProviderRequest};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Outcome of one stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage_name: String,
    pub index: usize,
    pub output: String,
    pub duration_ms: u64,
    pub tokens_used: u64,
    pub success: bool,
    pub error: Option<String>,
    pub model: Option<String>,
}

/// Outcome of a full staged run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiStageResult {
    /// True iff every stage succeeded
    pub success: bool,
    pub stage_results: Vec<StageResult>,
    pub final_output: String,
    /// Index of the stage that stopped the run, when `continue_on_failure`
    /// is off
    pub failed_stage: Option<usize>,
    pub total_duration_ms: u64,
}

/// Per-run stage execution policy
#[derive(Debug, Clone)]
pub struct StageRunOptions {
    pub continue_on_failure: bool,
    /// Persist a memory entry after each successful stage
    pub persist_memory: bool,
    /// Timeout applied to stages without their own override
    pub default_timeout: Duration,
}

/// Drives the ordered stage list of one agent
pub struct StageExecutor {
    sink: Arc<dyn EventSink>,
    memory: Arc<dyn MemoryStore>,
}

impl StageExecutor {
    pub fn new(sink: Arc<dyn EventSink>, memory: Arc<dyn MemoryStore>) -> Self {
        Self { sink, memory }
    }

    /// Run every stage in declared order, accumulating successful outputs
    pub async fn execute(
        &self,
        context: &ExecutionContext,
        stages: &[Stage],
        options: &StageRunOptions,
    ) -> MultiStageResult {
        let run_started = Instant::now();
        let system_prompt = compose_system_prompt(context);
        let mut stage_results: Vec<StageResult> = Vec::with_capacity(stages.len());
        let mut accumulated: Vec<(String, String)> = Vec::new();
        let mut failed_stage = None;

        for (index, stage) in stages.iter().enumerate() {
            self.sink.emit(ExecutionEvent::StageStarted {
                agent: context.agent.name.clone(),
                stage: stage.name.clone(),
                index,
            });

            let prompt = compose_stage_prompt(stage, &context.task, &accumulated);
            let request = ProviderRequest {
                id: uuid::Uuid::new_v4(),
                prompt,
                system_prompt: Some(system_prompt.clone()),
                model: stage.model.clone().or_else(|| context.agent.model.clone()),
                temperature: stage.temperature.or(context.agent.temperature),
                max_tokens: context.agent.max_tokens,
                top_p: None,
            };
            let timeout = stage
                .timeout
                .map(Duration::from_millis)
                .unwrap_or(options.default_timeout);

            let stage_started = Instant::now();
            let outcome = context.provider.execute(request, timeout).await;
            let duration_ms = stage_started.elapsed().as_millis() as u64;

            let result = match outcome {
                Ok(response) => {
                    accumulated.push((stage.name.clone(), response.content.clone()));
                    if options.persist_memory {
                        self.persist_stage_memory(context, stage, index, &response.content)
                            .await;
                    }
                    StageResult {
                        stage_name: stage.name.clone(),
                        index,
                        output: response.content,
                        duration_ms,
                        tokens_used: response.token_usage.total_tokens,
                        success: true,
                        error: None,
                        model: Some(response.model),
                    }
                }
                Err(error) => {
                    warn!(
                        "Stage {} of {} failed: {}",
                        stage.name, context.agent.name, error
                    );
                    StageResult {
                        stage_name: stage.name.clone(),
                        index,
                        output: String::new(),
                        duration_ms,
                        tokens_used: 0,
                        success: false,
                        error: Some(format_stage_error(&error)),
                        model: stage.model.clone().or_else(|| context.agent.model.clone()),
                    }
                }
            };

            self.sink.emit(ExecutionEvent::StageCompleted {
                agent: context.agent.name.clone(),
                stage: stage.name.clone(),
                index,
                success: result.success,
            });

            let stopped = !result.success && !options.continue_on_failure;
            if !result.success && failed_stage.is_none() {
                failed_stage = Some(index);
            }
            stage_results.push(result);
            if stopped {
                break;
            }
        }

        let success = stage_results.iter().all(|r| r.success)
            && stage_results.len() == stages.len();
        let final_output = assemble_final_output(&stage_results);
        info!(
            agent = %context.agent.name,
            stages = stage_results.len(),
            success,
            "Staged execution finished"
        );

        MultiStageResult {
            success,
            stage_results,
            final_output,
            failed_stage: if success { None } else { failed_stage },
            total_duration_ms: run_started.elapsed().as_millis() as u64,
        }
    }

    async fn persist_stage_memory(
        &self,
        context: &ExecutionContext,
        stage: &Stage,
        index: usize,
        output: &str,
    ) {
        let metadata = HashMap::from([
            ("type".to_string(), "task".to_string()),
            ("source".to_string(), context.agent.name.clone()),
            ("stage".to_string(), stage.name.clone()),
            ("index".to_string(), index.to_string()),
        ]);
        if let Err(e) = self
            .memory
            .add(MemoryEntry::new(output.to_string(), metadata))
            .await
        {
            warn!("Failed to persist stage output to memory: {}", e);
        }
    }
}

/// Compose the prompt for one stage
pub fn compose_stage_prompt(
    stage: &Stage,
    task: &str,
    prior_outputs: &[(String, String)],
) -> String {
    let mut prompt = format!("# Current Stage: {}\n\n{}\n", stage.name, stage.description);

    if let Some(ref questions) = stage.key_questions
        && !questions.is_empty()
    {
        prompt.push_str("\n## Key Questions\n");
        for question in questions {
            prompt.push_str(&format!("- {}\n", question));
        }
    }
    if let Some(ref outputs) = stage.expected_outputs
        && !outputs.is_empty()
    {
        prompt.push_str("\n## Expected Outputs\n");
        for output in outputs {
            prompt.push_str(&format!("- {}\n", output));
        }
    }

    prompt.push_str(&format!("\n## Original Task\n\n{}\n", task));

    if !prior_outputs.is_empty() {
        prompt.push_str("\n## Context from Previous Stages\n");
        for (i, (name, output)) in prior_outputs.iter().enumerate() {
            prompt.push_str(&format!("\n### Stage {}: {}\n\n{}\n", i + 1, name, output));
        }
    }

    prompt.push_str(&format!(
        "\nFocus on completing the current stage: {}.\n",
        stage.name
    ));
    prompt
}

/// Assemble the final document: a single stage passes its output through, a
/// multi-stage run concatenates outputs under success-marked headings
fn assemble_final_output(results: &[StageResult]) -> String {
    match results {
        [] => String::new(),
        [only] if only.success => only.output.clone(),
        [only] => format!(
            "## Stage 1: {} ✗\n\nStage failed: {}",
            only.stage_name,
            only.error.as_deref().unwrap_or("unknown error")
        ),
        many => many
            .iter()
            .map(|result| {
                let marker = if result.success { "✓" } else { "✗" };
                let body = if result.success {
                    result.output.as_str()
                } else {
                    result.error.as_deref().unwrap_or("unknown error")
                };
                format!(
                    "## Stage {}: {} {}\n\n{}",
                    result.index + 1,
                    result.stage_name,
                    marker,
                    body
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}

fn format_stage_error(error: &ProviderError) -> String {
    error.to_string()
}
