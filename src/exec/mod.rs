//! # Execution Engine
//!
//! Turns "run agent X on task T" into a bounded, observable sequence of
//! provider invocations.
//!
//! ## Core Components
//!
//! - **[`ExecutionController`]**: The facade binding everything together
//! - **[`StageExecutor`]**: Sequential staged workflows with context
//!   accumulation
//! - **[`ParallelExecutor`]**: Dependency-DAG scheduling with level-based
//!   batching and skip cascades
//! - **Delegation**: Capability-checked agent-to-agent sub-tasks
//!
//! ## Execution Shapes
//!
//! - Single agent without stages: context → one provider call
//! - Single agent with stages: ordered stage loop, each stage seeing prior
//!   successful outputs
//! - DAG run: agents scheduled by dependency level, bounded concurrency per
//!   batch
//! - Delegation: whitelist, cycle, and depth checks before the child runs

/// Execution controller facade.
pub mod controller;

/// Delegation policy and records.
pub mod delegation;

/// Dependency-DAG scheduling.
pub mod parallel;

/// Staged execution.
pub mod stage;


pub use controller::{
    ErrorReport, ExecutionController, ExecutionError, ExecutionOptions, ExecutionResult,
};
pub use delegation::{
    DelegationFailureReason, DelegationOutputs, DelegationRequest, DelegationResult,
    DelegationStatus,
};
pub use parallel::{
    AgentOutcome, DagError, DagNode, ExecutionPlan, LevelMode, LevelPlan, ParallelAgent,
    ParallelExecutor, ParallelRunResult, TimelineEntry, build_graph, build_plan,
};
pub use stage::{MultiStageResult, StageExecutor, StageResult, StageRunOptions};

use crate::context::ExecutionContext;

/// Compose the system prompt for one execution: the profile's system prompt,
/// personality coloring, abilities text, and injected memory.
pub fn compose_system_prompt(context: &ExecutionContext) -> String {
    let mut prompt = context.agent.system_prompt.clone();

    if let Some(ref personality) = context.agent.personality {
        let mut lines = Vec::new();
        if let Some(ref traits) = personality.traits
            && !traits.is_empty()
        {
            lines.push(format!("Traits: {}", traits.join(", ")));
        }
        if let Some(ref style) = personality.communication_style {
            lines.push(format!("Communication style: {}", style));
        }
        if let Some(ref decision_making) = personality.decision_making {
            lines.push(format!("Decision making: {}", decision_making));
        }
        if let Some(ref catchphrase) = personality.catchphrase {
            lines.push(format!("Catchphrase: {}", catchphrase));
        }
        if !lines.is_empty() {
            prompt.push_str("\n\n# Personality\n");
            for line in lines {
                prompt.push_str(&format!("- {}\n", line));
            }
        }
    }

    if let Some(ref patterns) = context.agent.thinking_patterns
        && !patterns.is_empty()
    {
        prompt.push_str("\n# Thinking Patterns\n");
        for pattern in patterns {
            prompt.push_str(&format!("- {}\n", pattern));
        }
    }

    if !context.abilities.is_empty() {
        prompt.push_str("\n\n# Abilities\n\n");
        prompt.push_str(&context.abilities);
    }

    if !context.memory.is_empty() {
        prompt.push_str("\n\n# Relevant Memory\n");
        for entry in &context.memory {
            prompt.push_str(&format!("- {}\n", entry.content));
        }
    }

    if let Some(ref orchestration) = context.orchestration
        && !orchestration.available_delegates.is_empty()
    {
        prompt.push_str(&format!(
            "\n\n# Delegation\n\nYou may delegate sub-tasks to: {}\n",
            orchestration.available_delegates.join(", ")
        ));
    }

    prompt
}
