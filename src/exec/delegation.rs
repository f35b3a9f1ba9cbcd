//! Delegation policy and records.
//!
//! Delegation lets an agent spawn a child task on another agent, subject to
//! a capability policy: the delegator must be authorized, the target must be
//! whitelisted, the chain must stay cycle-free, and the chain length must
//! stay under the delegator's depth limit. All preconditions are checked
//! before any provider work happens; the execution controller performs the
//! actual child run.

use crate::profile::AgentProfile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// A one-shot request to run a sub-task on another agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationRequest {
    pub from_agent: String,
    pub to_agent: String,
    pub task: String,
    pub session_id: Option<Uuid>,
    /// Agents that already delegated along this chain, oldest first
    pub delegation_chain: Vec<String>,
    /// Runtime timeout override for the child run, in milliseconds
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationStatus {
    Success,
    Failure,
    Timeout,
}

/// Closed set of reasons a delegation can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationFailureReason {
    Unauthorized,
    NotFound,
    MaxDepth,
    Cycle,
    Timeout,
    ExecutionFailed,
}

/// Artifacts surfaced from a successful child run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationOutputs {
    pub response: String,
    /// Files present in the child's workspace after the run
    pub files: Vec<PathBuf>,
    pub workspace: PathBuf,
}

/// Synchronous result of one delegation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationResult {
    pub delegation_id: Uuid,
    pub from_agent: String,
    pub to_agent: String,
    pub status: DelegationStatus,
    pub reason: Option<DelegationFailureReason>,
    pub outputs: Option<DelegationOutputs>,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl DelegationResult {
    /// A failure result bound to the request, with timestamps closed out now
    pub fn failure(
        request: &DelegationRequest,
        delegation_id: Uuid,
        started_at: DateTime<Utc>,
        reason: DelegationFailureReason,
    ) -> Self {
        let ended_at = Utc::now();
        Self {
            delegation_id,
            from_agent: request.from_agent.clone(),
            to_agent: request.to_agent.clone(),
            status: match reason {
                DelegationFailureReason::Timeout => DelegationStatus::Timeout,
                _ => DelegationStatus::Failure,
            },
            reason: Some(reason),
            outputs: None,
            duration_ms: (ended_at - started_at).num_milliseconds().max(0) as u64,
            started_at,
            ended_at,
        }
    }
}

/// Validate every precondition of a delegation request against the
/// delegator's profile. Returns the failure reason of the first violated
/// precondition, checked in authorization, whitelist, cycle, depth order.
pub fn check_preconditions(
    from_profile: &AgentProfile,
    request: &DelegationRequest,
) -> Result<(), DelegationFailureReason> {
    let Some(ref orchestration) = from_profile.orchestration else {
        return Err(DelegationFailureReason::Unauthorized);
    };
    if !orchestration.can_delegate {
        return Err(DelegationFailureReason::Unauthorized);
    }
    if !orchestration
        .can_delegate_to
        .iter()
        .any(|name| name == &request.to_agent)
    {
        return Err(DelegationFailureReason::Unauthorized);
    }
    if request
        .delegation_chain
        .iter()
        .any(|name| name == &request.to_agent)
        || request.to_agent == request.from_agent
    {
        return Err(DelegationFailureReason::Cycle);
    }
    if request.delegation_chain.len() >= orchestration.max_delegation_depth as usize {
        return Err(DelegationFailureReason::MaxDepth);
    }
    Ok(())
}
