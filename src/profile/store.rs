//! Agent profile loading, validation, and caching.
//!
//! Profiles live in a primary (project-local) directory with a built-in
//! fallback directory; the first readable file wins. Parsed profiles are
//! cached with a TTL, and display-name aliases are resolved through a lazily
//! built case-insensitive map.

use crate::profile::types::{AgentProfile, MAX_PROFILE_FILE_SIZE, ProfileError, name_pattern};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// How long a parsed profile stays valid in the cache
pub const PROFILE_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct CachedProfile {
    profile: Arc<AgentProfile>,
    loaded_at: Instant,
}

/// Loads and caches agent profiles, resolving display-name aliases
#[derive(Debug)]
pub struct ProfileStore {
    primary_dir: PathBuf,
    fallback_dir: Option<PathBuf>,
    cache: RwLock<HashMap<String, CachedProfile>>,
    /// Lowercased displayName -> profile name; None until first alias miss,
    /// rebuilt only after `clear_cache`
    aliases: RwLock<Option<HashMap<String, String>>>,
    ttl: Duration,
}

impl ProfileStore {
    pub fn new(primary_dir: PathBuf, fallback_dir: Option<PathBuf>) -> Self {
        Self {
            primary_dir,
            fallback_dir,
            cache: RwLock::new(HashMap::new()),
            aliases: RwLock::new(None),
            ttl: PROFILE_CACHE_TTL,
        }
    }

    #[cfg(test)]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Load a profile by its exact name
    pub async fn get(&self, name: &str) -> Result<Arc<AgentProfile>, ProfileError> {
        if !name_pattern().is_match(name) {
            return Err(ProfileError::InvalidName {
                name: name.to_string(),
            });
        }

        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(name)
                && cached.loaded_at.elapsed() < self.ttl
            {
                debug!("Profile cache hit: {}", name);
                return Ok(Arc::clone(&cached.profile));
            }
        }

        let profile = Arc::new(self.load_from_disk(name)?);
        self.cache.write().await.insert(
            name.to_string(),
            CachedProfile {
                profile: Arc::clone(&profile),
                loaded_at: Instant::now(),
            },
        );
        Ok(profile)
    }

    /// Resolve an identifier that may be a profile name or a display name.
    ///
    /// Exact profile-name matches always win over display-name aliases.
    pub async fn resolve(&self, identifier: &str) -> Result<Arc<AgentProfile>, ProfileError> {
        match self.get(identifier).await {
            Ok(profile) => Ok(profile),
            Err(ProfileError::NotFound { .. }) | Err(ProfileError::InvalidName { .. }) => {
                let name = self
                    .lookup_alias(identifier)
                    .await
                    .ok_or_else(|| ProfileError::NotFound {
                        name: identifier.to_string(),
                    })?;
                self.get(&name).await
            }
            Err(other) => Err(other),
        }
    }

    /// List all available profile names, sorted; union of primary and
    /// fallback directories
    pub async fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .profile_files()
            .into_iter()
            .filter_map(|path| {
                path.file_stem()
                    .map(|stem| stem.to_string_lossy().to_string())
            })
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Drop every cached profile and the alias map
    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
        *self.aliases.write().await = None;
        debug!("Profile cache cleared");
    }

    async fn lookup_alias(&self, identifier: &str) -> Option<String> {
        let key = identifier.to_lowercase();
        {
            let aliases = self.aliases.read().await;
            if let Some(ref map) = *aliases {
                // A second miss must not trigger a rebuild before clear_cache.
                return map.get(&key).cloned();
            }
        }

        let map = self.build_alias_map().await;
        let result = map.get(&key).cloned();
        *self.aliases.write().await = Some(map);
        result
    }

    async fn build_alias_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        let names: Vec<String> = self.list().await;
        let known: std::collections::HashSet<&str> = names.iter().map(|n| n.as_str()).collect();

        for name in &names {
            match self.load_from_disk(name) {
                Ok(profile) => {
                    if let Some(ref display_name) = profile.display_name {
                        let key = display_name.to_lowercase();
                        // A display name colliding with another profile's
                        // real name must not shadow it.
                        if known.contains(key.as_str()) {
                            continue;
                        }
                        map.entry(key).or_insert_with(|| name.clone());
                    }
                }
                Err(e) => warn!("Skipping profile {} while building aliases: {}", name, e),
            }
        }
        debug!("Built display-name alias map with {} entries", map.len());
        map
    }

    fn load_from_disk(&self, name: &str) -> Result<AgentProfile, ProfileError> {
        let path = self
            .find_profile_file(name)
            .ok_or_else(|| ProfileError::NotFound {
                name: name.to_string(),
            })?;

        let size = std::fs::metadata(&path)
            .map_err(|e| ProfileError::Io {
                name: name.to_string(),
                reason: e.to_string(),
            })?
            .len();
        if size > MAX_PROFILE_FILE_SIZE {
            return Err(ProfileError::TooLarge {
                name: name.to_string(),
                size,
            });
        }

        let content = std::fs::read_to_string(&path).map_err(|e| ProfileError::Io {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        let mut profile: AgentProfile =
            serde_yaml::from_str(&content).map_err(|e| ProfileError::ValidationFailed {
                name: name.to_string(),
                problems: vec![e.to_string()],
            })?;

        if profile.name.is_empty() {
            profile.name = name.to_string();
        }
        profile.validate()?;
        debug!("Loaded profile {} from {}", name, path.display());
        Ok(profile)
    }

    fn find_profile_file(&self, name: &str) -> Option<PathBuf> {
        let mut dirs: Vec<&Path> = vec![&self.primary_dir];
        if let Some(ref fallback) = self.fallback_dir {
            dirs.push(fallback);
        }
        for dir in dirs {
            for extension in ["yaml", "yml"] {
                let candidate = dir.join(format!("{}.{}", name, extension));
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
        None
    }

    fn profile_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let mut dirs: Vec<&Path> = vec![&self.primary_dir];
        if let Some(ref fallback) = self.fallback_dir {
            dirs.push(fallback);
        }
        for dir in dirs {
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    debug!("Profile directory {} unreadable: {}", dir.display(), e);
                    continue;
                }
            };
            for entry in entries.flatten() {
                let path = entry.path();
                let is_yaml = path
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false);
                if is_yaml {
                    files.push(path);
                }
            }
        }
        files
    }
}
