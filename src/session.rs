//! Multi-agent session tracking.
//!
//! Sessions group related agent runs behind one id with a shared workspace.
//! The manager owns a process-wide in-memory map with a hard cap and
//! age-based cleanup. Status moves monotonically from active to completed or
//! failed; completion is idempotent.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

/// Default hard cap on retained sessions
pub const MAX_SESSIONS: usize = 100;

/// Default age threshold for sweeping non-active sessions, in days
pub const DEFAULT_CLEANUP_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Failed,
}

/// A named grouping of related agent runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    /// The agent that opened the session; always first in `agents`
    pub initiator: String,
    pub task: String,
    /// Participating agents, ordered by join, unique
    pub agents: Vec<String>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error("session not found: {id}")]
    NotFound { id: Uuid },
    #[error("session {id} is no longer active")]
    AlreadyCompleted { id: Uuid },
    #[error("failed to create session: {reason}")]
    CreationFailed { reason: String },
}

impl SessionError {
    /// Stable numeric code grouped by kind
    pub fn code(&self) -> u16 {
        match self {
            SessionError::NotFound { .. } => 7001,
            SessionError::AlreadyCompleted { .. } => 7002,
            SessionError::CreationFailed { .. } => 7003,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SessionStats {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Process-wide session map with cap and age-based cleanup
#[derive(Debug)]
pub struct SessionManager {
    sessions: DashMap<Uuid, Session>,
    max_sessions: usize,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::with_capacity(MAX_SESSIONS)
    }

    pub fn with_capacity(max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_sessions: max_sessions.max(1),
        }
    }

    /// Create a session with a fresh id; the initiator joins immediately
    pub fn create_session(&self, initiator: &str, task: &str) -> Session {
        if self.sessions.len() >= self.max_sessions {
            self.cleanup();
        }

        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            initiator: initiator.to_string(),
            task: task.to_string(),
            agents: vec![initiator.to_string()],
            status: SessionStatus::Active,
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
        };
        info!("Created session {} for {}", session.id, initiator);
        self.sessions.insert(session.id, session.clone());
        session
    }

    /// Add an agent to a session; adding an existing agent is a no-op
    pub fn add_agent(&self, id: Uuid, agent: &str) -> Result<(), SessionError> {
        let mut session = self
            .sessions
            .get_mut(&id)
            .ok_or(SessionError::NotFound { id })?;
        if session.status != SessionStatus::Active {
            return Err(SessionError::AlreadyCompleted { id });
        }
        if !session.agents.iter().any(|a| a == agent) {
            session.agents.push(agent.to_string());
        }
        session.updated_at = Utc::now();
        Ok(())
    }

    pub fn get_session(&self, id: Uuid) -> Option<Session> {
        self.sessions.get(&id).map(|s| s.clone())
    }

    pub fn get_active_sessions(&self) -> Vec<Session> {
        self.sessions
            .iter()
            .filter(|s| s.status == SessionStatus::Active)
            .map(|s| s.clone())
            .collect()
    }

    /// Active sessions an agent participates in, newest first
    pub fn get_active_sessions_for_agent(&self, agent: &str) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .sessions
            .iter()
            .filter(|s| {
                s.status == SessionStatus::Active && s.agents.iter().any(|a| a == agent)
            })
            .map(|s| s.clone())
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions
    }

    /// Mark a session completed. Re-completing a completed session is a
    /// no-op; a failed session stays failed.
    pub fn complete_session(&self, id: Uuid) -> Result<(), SessionError> {
        let mut session = self
            .sessions
            .get_mut(&id)
            .ok_or(SessionError::NotFound { id })?;
        if session.status == SessionStatus::Active {
            session.status = SessionStatus::Completed;
            session.updated_at = Utc::now();
            debug!("Session {} completed", id);
        }
        Ok(())
    }

    /// Mark a session failed, recording the error in metadata
    pub fn fail_session(&self, id: Uuid, error: &str) -> Result<(), SessionError> {
        let mut session = self
            .sessions
            .get_mut(&id)
            .ok_or(SessionError::NotFound { id })?;
        if session.status == SessionStatus::Active {
            session.status = SessionStatus::Failed;
            session.metadata.insert(
                "error".to_string(),
                serde_json::Value::String(error.to_string()),
            );
            session.updated_at = Utc::now();
            debug!("Session {} failed: {}", id, error);
        }
        Ok(())
    }

    /// Merge entries into a session's metadata map
    pub fn update_metadata(
        &self,
        id: Uuid,
        entries: HashMap<String, serde_json::Value>,
    ) -> Result<(), SessionError> {
        let mut session = self
            .sessions
            .get_mut(&id)
            .ok_or(SessionError::NotFound { id })?;
        session.metadata.extend(entries);
        session.updated_at = Utc::now();
        Ok(())
    }

    /// Evict sessions until the map fits the cap again; non-active sessions
    /// go first, oldest by last update
    pub fn cleanup(&self) {
        let over = self.sessions.len().saturating_sub(self.max_sessions - 1);
        if over == 0 {
            return;
        }

        let mut candidates: Vec<(Uuid, SessionStatus, DateTime<Utc>)> = self
            .sessions
            .iter()
            .map(|s| (s.id, s.status, s.updated_at))
            .collect();
        candidates.sort_by_key(|(_, status, updated_at)| {
            (*status == SessionStatus::Active, *updated_at)
        });

        for (id, _, _) in candidates.into_iter().take(over) {
            self.sessions.remove(&id);
        }
        debug!("Session cleanup evicted down to {} entries", self.sessions.len());
    }

    /// Remove non-active sessions untouched for more than `days` days;
    /// returns how many were removed
    pub fn cleanup_old_sessions(&self, days: Option<i64>) -> usize {
        let threshold = Utc::now() - Duration::days(days.unwrap_or(DEFAULT_CLEANUP_DAYS));
        let stale: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|s| s.status != SessionStatus::Active && s.updated_at < threshold)
            .map(|s| s.id)
            .collect();
        let removed = stale.len();
        for id in stale {
            self.sessions.remove(&id);
        }
        if removed > 0 {
            info!("Removed {} stale sessions", removed);
        }
        removed
    }

    pub fn clear_all(&self) {
        self.sessions.clear();
    }

    pub fn stats(&self) -> SessionStats {
        let mut stats = SessionStats {
            total: self.sessions.len(),
            ..Default::default()
        };
        for session in self.sessions.iter() {
            match session.status {
                SessionStatus::Active => stats.active += 1,
                SessionStatus::Completed => stats.completed += 1,
                SessionStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_session_adds_initiator_first() {
        let manager = SessionManager::new();
        let session = manager.create_session("backend", "build the api");
        assert_eq!(session.agents, vec!["backend".to_string()]);
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.initiator, "backend");
    }

    #[test]
    fn test_add_agent_is_idempotent() {
        let manager = SessionManager::new();
        let session = manager.create_session("backend", "task");

        manager.add_agent(session.id, "frontend").unwrap();
        manager.add_agent(session.id, "frontend").unwrap();

        let stored = manager.get_session(session.id).unwrap();
        assert_eq!(stored.agents, vec!["backend", "frontend"]);
    }

    #[test]
    fn test_add_agent_to_completed_session_fails() {
        let manager = SessionManager::new();
        let session = manager.create_session("backend", "task");
        manager.complete_session(session.id).unwrap();

        let err = manager.add_agent(session.id, "frontend").unwrap_err();
        assert!(matches!(err, SessionError::AlreadyCompleted { .. }));
        assert_eq!(err.code(), 7002);
    }

    #[test]
    fn test_complete_is_idempotent() {
        let manager = SessionManager::new();
        let session = manager.create_session("backend", "task");
        manager.complete_session(session.id).unwrap();
        manager.complete_session(session.id).unwrap();
        assert_eq!(
            manager.get_session(session.id).unwrap().status,
            SessionStatus::Completed
        );
    }

    #[test]
    fn test_fail_session_records_error() {
        let manager = SessionManager::new();
        let session = manager.create_session("backend", "task");
        manager.fail_session(session.id, "provider exploded").unwrap();

        let stored = manager.get_session(session.id).unwrap();
        assert_eq!(stored.status, SessionStatus::Failed);
        assert_eq!(
            stored.metadata.get("error").and_then(|v| v.as_str()),
            Some("provider exploded")
        );

        // Completing a failed session must not revert its status.
        manager.complete_session(session.id).unwrap();
        assert_eq!(
            manager.get_session(session.id).unwrap().status,
            SessionStatus::Failed
        );
    }

    #[test]
    fn test_updated_at_is_monotonic() {
        let manager = SessionManager::new();
        let session = manager.create_session("backend", "task");
        let before = manager.get_session(session.id).unwrap().updated_at;

        manager.add_agent(session.id, "frontend").unwrap();
        let after = manager.get_session(session.id).unwrap().updated_at;
        assert!(after >= before);
    }

    #[test]
    fn test_active_sessions_for_agent_newest_first() {
        let manager = SessionManager::new();
        let first = manager.create_session("backend", "first");
        let second = manager.create_session("backend", "second");
        manager.complete_session(first.id).unwrap();
        let third = manager.create_session("planner", "third");
        manager.add_agent(third.id, "backend").unwrap();

        let sessions = manager.get_active_sessions_for_agent("backend");
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, third.id);
        assert_eq!(sessions[1].id, second.id);
    }

    #[test]
    fn test_capacity_cleanup_prefers_non_active() {
        let manager = SessionManager::with_capacity(3);
        let completed = manager.create_session("a", "t");
        manager.complete_session(completed.id).unwrap();
        let active_one = manager.create_session("b", "t");
        let active_two = manager.create_session("c", "t");

        // The cap is reached; the next create evicts the completed session.
        let newest = manager.create_session("d", "t");
        assert!(manager.get_session(completed.id).is_none());
        assert!(manager.get_session(active_one.id).is_some());
        assert!(manager.get_session(active_two.id).is_some());
        assert!(manager.get_session(newest.id).is_some());
    }

    #[test]
    fn test_cleanup_old_sessions_skips_active() {
        let manager = SessionManager::new();
        let old_completed = manager.create_session("a", "t");
        manager.complete_session(old_completed.id).unwrap();
        let old_active = manager.create_session("b", "t");

        // Backdate both sessions past the threshold.
        for id in [old_completed.id, old_active.id] {
            let mut session = manager.sessions.get_mut(&id).unwrap();
            session.updated_at = Utc::now() - Duration::days(10);
        }

        let removed = manager.cleanup_old_sessions(None);
        assert_eq!(removed, 1);
        assert!(manager.get_session(old_active.id).is_some());
    }

    #[test]
    fn test_stats() {
        let manager = SessionManager::new();
        let a = manager.create_session("a", "t");
        let b = manager.create_session("b", "t");
        manager.create_session("c", "t");
        manager.complete_session(a.id).unwrap();
        manager.fail_session(b.id, "boom").unwrap();

        let stats = manager.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);

        manager.clear_all();
        assert_eq!(manager.stats().total, 0);
    }
}
