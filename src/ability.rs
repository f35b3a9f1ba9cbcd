//! Ability document store.
//!
//! Abilities are plain-text capability briefs that augment an agent's prompt.
//! Bodies are opaque and never interpreted as code. Names share the profile
//! charset; anything else is rejected before touching the filesystem, which
//! also rules out traversal and shell metacharacters.

use crate::profile::types::name_pattern;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Maximum size of an ability file on disk
pub const MAX_ABILITY_FILE_SIZE: u64 = 500 * 1024;

/// Default number of ability bodies kept in the LRU cache
pub const DEFAULT_ABILITY_CACHE_SIZE: usize = 64;

#[derive(Debug, Clone, thiserror::Error)]
pub enum AbilityError {
    #[error("ability not found: {name}")]
    NotFound { name: String },
    #[error("invalid ability name: {name}")]
    InvalidName { name: String },
    #[error("ability {name} is too large: {size} bytes > {MAX_ABILITY_FILE_SIZE}")]
    TooLarge { name: String, size: u64 },
    #[error("failed to read ability {name}: {reason}")]
    Io { name: String, reason: String },
}

impl AbilityError {
    /// Stable numeric code grouped by kind
    pub fn code(&self) -> u16 {
        match self {
            AbilityError::NotFound { .. } => 2101,
            AbilityError::InvalidName { .. } => 2102,
            AbilityError::TooLarge { .. } => 2103,
            AbilityError::Io { .. } => 2104,
        }
    }
}

/// Loads ability bodies with an LRU cache and composes abilities text
pub struct AbilityStore {
    abilities_dir: PathBuf,
    cache: Mutex<LruCache<String, Arc<String>>>,
}

impl AbilityStore {
    pub fn new(abilities_dir: PathBuf) -> Self {
        Self::with_cache_size(abilities_dir, DEFAULT_ABILITY_CACHE_SIZE)
    }

    pub fn with_cache_size(abilities_dir: PathBuf, cache_size: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_size.max(1)).expect("non-zero cache size");
        Self {
            abilities_dir,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Return the text body of a named ability
    pub async fn get(&self, name: &str) -> Result<Arc<String>, AbilityError> {
        if !name_pattern().is_match(name) {
            return Err(AbilityError::InvalidName {
                name: name.to_string(),
            });
        }

        if let Some(body) = self.cache.lock().await.get(name) {
            debug!("Ability cache hit: {}", name);
            return Ok(Arc::clone(body));
        }

        let body = Arc::new(self.load_from_disk(name)?);
        self.cache
            .lock()
            .await
            .put(name.to_string(), Arc::clone(&body));
        Ok(body)
    }

    /// Concatenate the bodies of the given abilities in input order.
    ///
    /// Each body is preceded by a `## Ability: <name>` header; bodies are
    /// separated by a horizontal rule. Missing abilities are skipped with a
    /// warning and never fail the call; the result is empty when none
    /// resolved.
    pub async fn abilities_text(&self, names: &[String]) -> String {
        let mut sections = Vec::new();
        for name in names {
            match self.get(name).await {
                Ok(body) => {
                    sections.push(format!("## Ability: {}\n\n{}", name, body.trim_end()));
                }
                Err(e) => {
                    warn!("Skipping ability {}: {}", name, e);
                }
            }
        }
        sections.join("\n\n---\n\n")
    }

    /// Drop every cached ability body
    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
        debug!("Ability cache cleared");
    }

    fn load_from_disk(&self, name: &str) -> Result<String, AbilityError> {
        let path = self.abilities_dir.join(format!("{}.md", name));
        if !path.is_file() {
            return Err(AbilityError::NotFound {
                name: name.to_string(),
            });
        }

        let size = std::fs::metadata(&path)
            .map_err(|e| AbilityError::Io {
                name: name.to_string(),
                reason: e.to_string(),
            })?
            .len();
        if size > MAX_ABILITY_FILE_SIZE {
            return Err(AbilityError::TooLarge {
                name: name.to_string(),
                size,
            });
        }

        std::fs::read_to_string(&path).map_err(|e| AbilityError::Io {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }
}
