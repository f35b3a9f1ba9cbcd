//! Dependency-aware multi-agent scheduling.
//!
//! Agents declare dependencies on other agents in the run. The executor
//! builds a DAG, assigns each agent the level `1 + max(level of deps)`,
//! and processes levels in ascending order. Agents within a level run in
//! concurrency-bounded batches; a level containing any non-parallel agent
//! runs one agent at a time. When a dependency fails, its transitive
//! dependents are recorded as skipped.

use crate::events::{EventSink, ExecutionEvent};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One agent in a DAG run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelAgent {
    pub name: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Whether this agent may run concurrently with its level peers
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

fn default_parallel() -> bool {
    true
}

impl ParallelAgent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            parallel: true,
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DagError {
    #[error("circular dependency involving: {}", agents.join(", "))]
    CircularDependency { agents: Vec<String> },
    #[error("agent {agent} depends on unknown agent {dependency}")]
    UnknownDependency { agent: String, dependency: String },
}

impl DagError {
    /// Stable numeric code grouped by kind
    pub fn code(&self) -> u16 {
        match self {
            DagError::CircularDependency { .. } => 6101,
            DagError::UnknownDependency { .. } => 6102,
        }
    }
}

/// One node of the computed DAG
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagNode {
    pub name: String,
    pub dependencies: Vec<String>,
    /// 0 for independent agents, otherwise `1 + max(level of deps)`
    pub level: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelMode {
    Parallel,
    Sequential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelPlan {
    pub level: usize,
    pub mode: LevelMode,
    /// Batches of at most `max_concurrent` agents; singleton batches in
    /// sequential mode
    pub batches: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub levels: Vec<LevelPlan>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentOutcome {
    Completed,
    Failed,
    Skipped,
}

/// One timeline record per executed or skipped agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub agent: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub level: usize,
    pub status: AgentOutcome,
    pub error: Option<String>,
}

/// Result of one DAG run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelRunResult {
    /// True iff no agent failed
    pub success: bool,
    pub completed_agents: Vec<String>,
    pub failed_agents: Vec<String>,
    pub skipped_agents: Vec<String>,
    pub timeline: Vec<TimelineEntry>,
    pub total_duration_ms: u64,
    pub graph: Vec<DagNode>,
    pub plan: ExecutionPlan,
}

/// Build DAG nodes with levels, rejecting cycles and unknown dependencies
pub fn build_graph(agents: &[ParallelAgent]) -> Result<Vec<DagNode>, DagError> {
    let known: HashSet<&str> = agents.iter().map(|a| a.name.as_str()).collect();
    let by_name: HashMap<&str, &ParallelAgent> =
        agents.iter().map(|a| (a.name.as_str(), a)).collect();

    for agent in agents {
        for dependency in &agent.dependencies {
            if !known.contains(dependency.as_str()) {
                return Err(DagError::UnknownDependency {
                    agent: agent.name.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        Visiting,
        Done,
    }

    fn assign_level<'a>(
        name: &'a str,
        by_name: &HashMap<&'a str, &'a ParallelAgent>,
        marks: &mut HashMap<&'a str, Mark>,
        levels: &mut HashMap<&'a str, usize>,
        trail: &mut Vec<String>,
    ) -> Result<usize, DagError> {
        match marks.get(name).copied().unwrap_or(Mark::Unvisited) {
            Mark::Done => return Ok(levels[name]),
            Mark::Visiting => {
                return Err(DagError::CircularDependency {
                    agents: trail.clone(),
                });
            }
            Mark::Unvisited => {}
        }

        marks.insert(name, Mark::Visiting);
        trail.push(name.to_string());
        let agent = by_name[name];
        let mut level = 0;
        for dependency in &agent.dependencies {
            let dep_level = assign_level(dependency, by_name, marks, levels, trail)?;
            level = level.max(dep_level + 1);
        }
        trail.pop();
        marks.insert(name, Mark::Done);
        levels.insert(name, level);
        Ok(level)
    }

    let mut marks = HashMap::new();
    let mut levels = HashMap::new();
    for agent in agents {
        let mut trail = Vec::new();
        assign_level(
            agent.name.as_str(),
            &by_name,
            &mut marks,
            &mut levels,
            &mut trail,
        )?;
    }

    Ok(agents
        .iter()
        .map(|agent| DagNode {
            name: agent.name.clone(),
            dependencies: agent.dependencies.clone(),
            level: levels[agent.name.as_str()],
        })
        .collect())
}

/// Partition the graph into per-level batches.
///
/// A level containing any agent with `parallel == false` runs in sequential
/// mode with singleton batches; otherwise batches hold at most
/// `max_concurrent` agents (clamped to at least one).
pub fn build_plan(
    agents: &[ParallelAgent],
    graph: &[DagNode],
    max_concurrent: u32,
) -> ExecutionPlan {
    let parallel_flags: HashMap<&str, bool> = agents
        .iter()
        .map(|a| (a.name.as_str(), a.parallel))
        .collect();

    let max_level = graph.iter().map(|n| n.level).max().unwrap_or(0);
    let mut levels = Vec::new();
    for level in 0..=max_level {
        let members: Vec<&DagNode> = graph.iter().filter(|n| n.level == level).collect();
        if members.is_empty() {
            continue;
        }
        let mode = if members
            .iter()
            .any(|n| !parallel_flags.get(n.name.as_str()).copied().unwrap_or(true))
        {
            LevelMode::Sequential
        } else {
            LevelMode::Parallel
        };
        let batch_size = match mode {
            LevelMode::Sequential => 1,
            LevelMode::Parallel => max_concurrent.max(1) as usize,
        };
        let batches = members
            .chunks(batch_size)
            .map(|chunk| chunk.iter().map(|n| n.name.clone()).collect())
            .collect();
        levels.push(LevelPlan {
            level,
            mode,
            batches,
        });
    }
    ExecutionPlan { levels }
}

/// Agents reachable from `roots` along reverse dependency edges
fn transitive_dependents(graph: &[DagNode], roots: &[String]) -> HashSet<String> {
    let mut dependents_of: HashMap<&str, Vec<&str>> = HashMap::new();
    for node in graph {
        for dependency in &node.dependencies {
            dependents_of
                .entry(dependency.as_str())
                .or_default()
                .push(node.name.as_str());
        }
    }

    let mut reached = HashSet::new();
    let mut queue: VecDeque<&str> = roots.iter().map(String::as_str).collect();
    while let Some(current) = queue.pop_front() {
        for &dependent in dependents_of.get(current).map(Vec::as_slice).unwrap_or(&[]) {
            if reached.insert(dependent.to_string()) {
                queue.push_back(dependent);
            }
        }
    }
    reached
}

/// Executes DAG runs over a caller-supplied agent runner
pub struct ParallelExecutor {
    sink: Arc<dyn EventSink>,
    max_concurrent: u32,
    continue_on_failure: bool,
}

impl ParallelExecutor {
    pub fn new(sink: Arc<dyn EventSink>, max_concurrent: u32, continue_on_failure: bool) -> Self {
        Self {
            sink,
            max_concurrent,
            continue_on_failure,
        }
    }

    /// Run the agents level by level. The runner receives an agent name and
    /// yields its output or an error message.
    pub async fn execute<'a, F>(
        &self,
        agents: &[ParallelAgent],
        runner: F,
    ) -> Result<ParallelRunResult, DagError>
    where
        F: Fn(String) -> BoxFuture<'a, Result<String, String>>,
    {
        let graph = build_graph(agents)?;
        let plan = build_plan(agents, &graph, self.max_concurrent);
        let level_of: HashMap<&str, usize> =
            graph.iter().map(|n| (n.name.as_str(), n.level)).collect();
        let deps_of: HashMap<&str, &[String]> = graph
            .iter()
            .map(|n| (n.name.as_str(), n.dependencies.as_slice()))
            .collect();

        let run_started = Instant::now();
        let mut timeline: Vec<TimelineEntry> = Vec::with_capacity(agents.len());
        let mut completed: Vec<String> = Vec::new();
        let mut failed: Vec<String> = Vec::new();
        let mut skipped: Vec<String> = Vec::new();
        let mut aborted = false;

        info!(
            agents = agents.len(),
            levels = plan.levels.len(),
            "Starting DAG run"
        );

        'levels: for level_plan in &plan.levels {
            for batch in &level_plan.batches {
                // Separate agents with a failed or skipped dependency; they
                // never become eligible.
                let mut runnable: Vec<&str> = Vec::new();
                for name in batch {
                    let bad_dependency = deps_of
                        .get(name.as_str())
                        .into_iter()
                        .flat_map(|deps| deps.iter())
                        .find(|dep| {
                            failed.iter().any(|f| f == *dep)
                                || skipped.iter().any(|s| s == *dep)
                        });
                    match bad_dependency {
                        Some(dependency) => {
                            self.record_skip(
                                &mut timeline,
                                &mut skipped,
                                name,
                                level_of[name.as_str()],
                                &format!("dependency {} did not complete", dependency),
                                dependency,
                            );
                        }
                        None => runnable.push(name.as_str()),
                    }
                }

                let executions = runnable.iter().map(|name| {
                    let future = runner(name.to_string());
                    async move {
                        let started_at = Utc::now();
                        let outcome = future.await;
                        (name.to_string(), started_at, Utc::now(), outcome)
                    }
                });
                let results = futures::future::join_all(executions).await;

                for (name, started_at, ended_at, outcome) in results {
                    let level = level_of[name.as_str()];
                    let duration_ms = (ended_at - started_at).num_milliseconds().max(0) as u64;
                    match outcome {
                        Ok(_) => {
                            completed.push(name.clone());
                            timeline.push(TimelineEntry {
                                agent: name,
                                started_at,
                                ended_at,
                                duration_ms,
                                level,
                                status: AgentOutcome::Completed,
                                error: None,
                            });
                        }
                        Err(error) => {
                            warn!("Agent {} failed: {}", name, error);
                            failed.push(name.clone());
                            timeline.push(TimelineEntry {
                                agent: name,
                                started_at,
                                ended_at,
                                duration_ms,
                                level,
                                status: AgentOutcome::Failed,
                                error: Some(error),
                            });
                        }
                    }
                }

                if !failed.is_empty() && !self.continue_on_failure {
                    aborted = true;
                    break 'levels;
                }
            }
        }

        if aborted {
            // Everything that never started is recorded as skipped; direct
            // and transitive dependents name their failed dependency.
            let dependents = transitive_dependents(&graph, &failed);
            let ran: HashSet<&str> = timeline.iter().map(|e| e.agent.as_str()).collect();
            let first_failed = failed.first().cloned().unwrap_or_default();
            let unstarted: Vec<&ParallelAgent> = agents
                .iter()
                .filter(|a| !ran.contains(a.name.as_str()))
                .collect();
            for agent in unstarted {
                let reason = if dependents.contains(&agent.name) {
                    format!("dependency {} failed", first_failed)
                } else {
                    format!("run aborted after failure of {}", first_failed)
                };
                self.record_skip(
                    &mut timeline,
                    &mut skipped,
                    &agent.name,
                    level_of[agent.name.as_str()],
                    &reason,
                    &first_failed,
                );
            }
        }

        let success = failed.is_empty();
        debug!(
            completed = completed.len(),
            failed = failed.len(),
            skipped = skipped.len(),
            "DAG run finished"
        );

        Ok(ParallelRunResult {
            success,
            completed_agents: completed,
            failed_agents: failed,
            skipped_agents: skipped,
            timeline,
            total_duration_ms: run_started.elapsed().as_millis() as u64,
            graph,
            plan,
        })
    }

    fn record_skip(
        &self,
        timeline: &mut Vec<TimelineEntry>,
        skipped: &mut Vec<String>,
        agent: &str,
        level: usize,
        reason: &str,
        failed_dependency: &str,
    ) {
        let now = Utc::now();
        skipped.push(agent.to_string());
        timeline.push(TimelineEntry {
            agent: agent.to_string(),
            started_at: now,
            ended_at: now,
            duration_ms: 0,
            level,
            status: AgentOutcome::Skipped,
            error: Some(reason.to_string()),
        });
        self.sink.emit(ExecutionEvent::AgentSkipped {
            agent: agent.to_string(),
            failed_dependency: failed_dependency.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingSink;

    fn agent(name: &str, deps: &[&str]) -> ParallelAgent {
        ParallelAgent::new(name).with_dependencies(deps.iter().map(|s| s.to_string()).collect())
    }

    fn executor(continue_on_failure: bool) -> ParallelExecutor {
        ParallelExecutor::new(Arc::new(CollectingSink::new()), 4, continue_on_failure)
    }

    #[test]
    fn test_level_assignment() {
        let agents = vec![
            agent("a", &[]),
            agent("b", &["a"]),
            agent("c", &["a", "b"]),
            agent("d", &[]),
        ];
        let graph = build_graph(&agents).unwrap();
        let levels: HashMap<&str, usize> =
            graph.iter().map(|n| (n.name.as_str(), n.level)).collect();
        assert_eq!(levels["a"], 0);
        assert_eq!(levels["b"], 1);
        assert_eq!(levels["c"], 2);
        assert_eq!(levels["d"], 0);
    }

    #[test]
    fn test_cycle_rejected() {
        let agents = vec![agent("a", &["c"]), agent("b", &["a"]), agent("c", &["b"])];
        let err = build_graph(&agents).unwrap_err();
        assert!(matches!(err, DagError::CircularDependency { .. }));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let agents = vec![agent("a", &["ghost"])];
        match build_graph(&agents).unwrap_err() {
            DagError::UnknownDependency { agent, dependency } => {
                assert_eq!(agent, "a");
                assert_eq!(dependency, "ghost");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_plan_batches_bounded_by_concurrency() {
        let agents = vec![
            agent("a", &[]),
            agent("b", &[]),
            agent("c", &[]),
            agent("d", &[]),
            agent("e", &[]),
        ];
        let graph = build_graph(&agents).unwrap();
        let plan = build_plan(&agents, &graph, 2);
        assert_eq!(plan.levels.len(), 1);
        assert_eq!(plan.levels[0].mode, LevelMode::Parallel);
        assert_eq!(plan.levels[0].batches.len(), 3);
        assert!(plan.levels[0].batches.iter().all(|b| b.len() <= 2));
    }

    #[test]
    fn test_sequential_agent_forces_singleton_batches() {
        let agents = vec![agent("a", &[]), agent("b", &[]).sequential()];
        let graph = build_graph(&agents).unwrap();
        let plan = build_plan(&agents, &graph, 4);
        assert_eq!(plan.levels[0].mode, LevelMode::Sequential);
        assert!(plan.levels[0].batches.iter().all(|b| b.len() == 1));
    }

    #[test]
    fn test_non_positive_concurrency_falls_back_to_one() {
        let agents = vec![agent("a", &[]), agent("b", &[])];
        let graph = build_graph(&agents).unwrap();
        let plan = build_plan(&agents, &graph, 0);
        assert!(plan.levels[0].batches.iter().all(|b| b.len() == 1));
    }

    #[tokio::test]
    async fn test_successful_run_in_dependency_order() {
        let agents = vec![agent("a", &[]), agent("b", &["a"]), agent("c", &["b"])];
        let result = executor(false)
            .execute(&agents, |name| {
                Box::pin(async move { Ok(format!("{} done", name)) })
            })
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.completed_agents, vec!["a", "b", "c"]);
        assert!(result.failed_agents.is_empty());
        assert!(result.skipped_agents.is_empty());

        // For every edge, the dependency's end precedes the dependent's
        // start.
        let entry = |name: &str| {
            result
                .timeline
                .iter()
                .find(|e| e.agent == name)
                .unwrap()
                .clone()
        };
        assert!(entry("a").ended_at <= entry("b").started_at);
        assert!(entry("b").ended_at <= entry("c").started_at);
    }

    #[tokio::test]
    async fn test_failure_cascades_to_dependents() {
        let agents = vec![agent("a", &[]), agent("b", &["a"]), agent("c", &["b"])];
        let result = executor(false)
            .execute(&agents, |name| {
                Box::pin(async move {
                    if name == "a" {
                        Err("boom".to_string())
                    } else {
                        Ok("done".to_string())
                    }
                })
            })
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.completed_agents.is_empty());
        assert_eq!(result.failed_agents, vec!["a"]);
        assert_eq!(result.skipped_agents, vec!["b", "c"]);
        assert_eq!(result.timeline.len(), 3);

        let levels: Vec<usize> = result.timeline.iter().map(|e| e.level).collect();
        assert_eq!(levels, vec![0, 1, 2]);

        // Skipped entries carry synthetic zero-duration timestamps.
        for entry in result.timeline.iter().filter(|e| e.agent != "a") {
            assert_eq!(entry.status, AgentOutcome::Skipped);
            assert_eq!(entry.duration_ms, 0);
            assert_eq!(entry.started_at, entry.ended_at);
        }
    }

    #[tokio::test]
    async fn test_continue_on_failure_runs_independent_branch() {
        let agents = vec![
            agent("a", &[]),
            agent("b", &["a"]),
            agent("x", &[]),
            agent("y", &["x"]),
        ];
        let result = executor(true)
            .execute(&agents, |name| {
                Box::pin(async move {
                    if name == "a" {
                        Err("boom".to_string())
                    } else {
                        Ok("done".to_string())
                    }
                })
            })
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.failed_agents, vec!["a"]);
        // The x -> y branch is unaffected; only b is skipped.
        assert_eq!(result.skipped_agents, vec!["b"]);
        assert!(result.completed_agents.contains(&"x".to_string()));
        assert!(result.completed_agents.contains(&"y".to_string()));
    }
}
