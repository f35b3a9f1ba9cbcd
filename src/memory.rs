//! Injected memory capability.
//!
//! The vector/FTS memory store is an external collaborator; only its
//! interface lives here. The execution engine adds entries after provider
//! work and queries for the top-K entries relevant to a task. Query failures
//! are recoverable: the context builder logs a warning and proceeds with an
//! empty memory list.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// One persisted memory entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Free-form tags such as type/source/stage set by the writer
    pub metadata: HashMap<String, String>,
}

impl MemoryEntry {
    pub fn new(content: impl Into<String>, metadata: HashMap<String, String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            created_at: Utc::now(),
            metadata,
        }
    }
}

/// Aggregate statistics reported by the store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total_entries: u64,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum MemoryError {
    #[error("memory store not initialized")]
    NotInitialized,
    #[error("memory query failed: {0}")]
    QueryError(String),
    #[error("memory capacity exceeded: {current} entries >= limit {limit}")]
    CapacityExceeded { current: u64, limit: u64 },
}

impl MemoryError {
    /// Stable numeric code grouped by kind
    pub fn code(&self) -> u16 {
        match self {
            MemoryError::NotInitialized => 4001,
            MemoryError::QueryError(_) => 4002,
            MemoryError::CapacityExceeded { .. } => 4003,
        }
    }
}

/// Memory capability as seen by the execution engine
pub trait MemoryStore: Send + Sync {
    /// Persist an entry
    fn add(&self, entry: MemoryEntry) -> BoxFuture<'_, Result<(), MemoryError>>;

    /// Return up to `limit` entries most relevant to `query`, newest first
    /// among equally relevant entries
    fn search(&self, query: &str, limit: usize)
    -> BoxFuture<'_, Result<Vec<MemoryEntry>, MemoryError>>;

    /// Aggregate statistics
    fn stats(&self) -> BoxFuture<'_, Result<MemoryStats, MemoryError>>;
}

/// Simple in-process store with substring relevance, used by tests and as a
/// development fallback when no real store is injected
#[derive(Debug, Default)]
pub struct InMemoryMemoryStore {
    entries: Arc<RwLock<Vec<MemoryEntry>>>,
    max_entries: Option<u64>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity_limit(max_entries: u64) -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            max_entries: Some(max_entries),
        }
    }
}

impl MemoryStore for InMemoryMemoryStore {
    fn add(&self, entry: MemoryEntry) -> BoxFuture<'_, Result<(), MemoryError>> {
        Box::pin(async move {
            let mut entries = self.entries.write().await;
            if let Some(limit) = self.max_entries
                && entries.len() as u64 >= limit
            {
                return Err(MemoryError::CapacityExceeded {
                    current: entries.len() as u64,
                    limit,
                });
            }
            entries.push(entry);
            Ok(())
        })
    }

    fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<MemoryEntry>, MemoryError>> {
        let query = query.to_lowercase();
        Box::pin(async move {
            let entries = self.entries.read().await;
            let mut hits: Vec<MemoryEntry> = entries
                .iter()
                .filter(|e| {
                    let content = e.content.to_lowercase();
                    query
                        .split_whitespace()
                        .any(|word| !word.is_empty() && content.contains(word))
                })
                .cloned()
                .collect();
            hits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            hits.truncate(limit);
            Ok(hits)
        })
    }

    fn stats(&self) -> BoxFuture<'_, Result<MemoryStats, MemoryError>> {
        Box::pin(async move {
            let entries = self.entries.read().await;
            Ok(MemoryStats {
                total_entries: entries.len() as u64,
                total_bytes: entries.iter().map(|e| e.content.len() as u64).sum(),
            })
        })
    }
}

/// Store that remembers nothing and finds nothing
#[derive(Debug, Default)]
pub struct NullMemory;

impl MemoryStore for NullMemory {
    fn add(&self, _entry: MemoryEntry) -> BoxFuture<'_, Result<(), MemoryError>> {
        Box::pin(async { Ok(()) })
    }

    fn search(
        &self,
        _query: &str,
        _limit: usize,
    ) -> BoxFuture<'_, Result<Vec<MemoryEntry>, MemoryError>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn stats(&self) -> BoxFuture<'_, Result<MemoryStats, MemoryError>> {
        Box::pin(async { Ok(MemoryStats::default()) })
    }
}

/// Store that always fails queries; exercises the warn-and-continue path
#[derive(Debug, Default)]
pub struct FailingMemory;

impl MemoryStore for FailingMemory {
    fn add(&self, _entry: MemoryEntry) -> BoxFuture<'_, Result<(), MemoryError>> {
        Box::pin(async { Err(MemoryError::QueryError("store offline".to_string())) })
    }

    fn search(
        &self,
        _query: &str,
        _limit: usize,
    ) -> BoxFuture<'_, Result<Vec<MemoryEntry>, MemoryError>> {
        Box::pin(async { Err(MemoryError::QueryError("store offline".to_string())) })
    }

    fn stats(&self) -> BoxFuture<'_, Result<MemoryStats, MemoryError>> {
        Box::pin(async { Err(MemoryError::QueryError("store offline".to_string())) })
    }
}
