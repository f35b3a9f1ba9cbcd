//! Two-tier response cache in front of provider execution.
//!
//! L1 is an in-process LRU; L2 is a persistent key-value store with a TTL.
//! Keys are SHA-256 digests of provider ⨁ prompt ⨁ canonical parameter JSON,
//! with parameter keys serialized in sorted order so equivalent parameter
//! objects produce equal keys. When disabled, every operation is a no-op.

use crate::provider::types::ModelParams;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Default L2 time-to-live
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    /// L1 capacity in entries
    pub max_memory_entries: usize,
    /// L2 capacity in entries
    pub max_entries: usize,
    pub ttl: Duration,
    /// L2 backing file; memory-only when absent
    pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_memory_entries: 128,
            max_entries: 1024,
            ttl: DEFAULT_CACHE_TTL,
            path: None,
        }
    }
}

/// One cached provider response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub provider: String,
    pub prompt: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub access_count: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub memory_entries: usize,
    pub persistent_entries: usize,
}

struct CacheInner {
    memory: LruCache<String, CacheEntry>,
    persistent: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
}

/// Two-tier response cache
pub struct ResponseCache {
    config: CacheConfig,
    inner: Mutex<CacheInner>,
}

/// Deterministic cache key: SHA-256 over provider, prompt, and the model
/// parameters serialized with sorted keys
pub fn cache_key(provider: &str, prompt: &str, params: &ModelParams) -> String {
    let value = serde_json::to_value(params).unwrap_or(serde_json::Value::Null);
    let sorted: BTreeMap<String, serde_json::Value> = match value {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        _ => BTreeMap::new(),
    };
    let canonical = serde_json::to_string(&sorted).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(provider.as_bytes());
    hasher.update([0u8]);
    hasher.update(prompt.as_bytes());
    hasher.update([0u8]);
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl ResponseCache {
    /// Open the cache, loading the L2 file when configured and sweeping
    /// expired entries eagerly
    pub fn open(config: CacheConfig) -> Self {
        let memory_capacity =
            NonZeroUsize::new(config.max_memory_entries.max(1)).expect("non-zero capacity");
        let mut persistent = HashMap::new();

        if config.enabled
            && let Some(ref path) = config.path
            && path.is_file()
        {
            match std::fs::read_to_string(path) {
                Ok(content) => match serde_json::from_str::<Vec<CacheEntry>>(&content) {
                    Ok(entries) => {
                        let now = Utc::now();
                        let total = entries.len();
                        for entry in entries {
                            if !entry.is_expired(now) {
                                persistent.insert(entry.key.clone(), entry);
                            }
                        }
                        debug!(
                            "Loaded response cache: {} live of {} stored entries",
                            persistent.len(),
                            total
                        );
                    }
                    Err(e) => warn!("Discarding corrupt response cache: {}", e),
                },
                Err(e) => warn!("Failed to read response cache: {}", e),
            }
        }

        Self {
            config,
            inner: Mutex::new(CacheInner {
                memory: LruCache::new(memory_capacity),
                persistent,
                hits: 0,
                misses: 0,
            }),
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Look up a cached response. Returns None when disabled, missing, or
    /// expired; hits bump the access counter in both tiers.
    pub async fn get(&self, provider: &str, prompt: &str, params: &ModelParams) -> Option<String> {
        if !self.config.enabled {
            return None;
        }
        let key = cache_key(provider, prompt, params);
        let now = Utc::now();
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        if let Some(entry) = inner.memory.get_mut(&key) {
            if !entry.is_expired(now) {
                entry.access_count += 1;
                let response = entry.response.clone();
                if let Some(stored) = inner.persistent.get_mut(&key) {
                    stored.access_count += 1;
                }
                inner.hits += 1;
                return Some(response);
            }
            inner.memory.pop(&key);
        }

        if let Some(entry) = inner.persistent.get_mut(&key) {
            if !entry.is_expired(now) {
                entry.access_count += 1;
                let promoted = entry.clone();
                let response = promoted.response.clone();
                inner.memory.put(key, promoted);
                inner.hits += 1;
                return Some(response);
            }
            inner.persistent.remove(&key);
        }

        inner.misses += 1;
        None
    }

    /// Insert a successful response into both tiers. No-op when disabled.
    pub async fn put(&self, provider: &str, prompt: &str, params: &ModelParams, response: &str) {
        if !self.config.enabled {
            return;
        }
        let key = cache_key(provider, prompt, params);
        let now = Utc::now();
        let ttl = ChronoDuration::from_std(self.config.ttl)
            .unwrap_or_else(|_| ChronoDuration::hours(24));
        let entry = CacheEntry {
            key: key.clone(),
            provider: provider.to_string(),
            prompt: prompt.to_string(),
            response: response.to_string(),
            timestamp: now,
            expires_at: now + ttl,
            access_count: 0,
        };

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        // Opportunistic expiry sweep before the size check.
        inner.persistent.retain(|_, e| !e.is_expired(now));

        if !inner.persistent.contains_key(&key)
            && inner.persistent.len() + 1 > self.config.max_entries
        {
            evict_oldest(&mut inner.persistent, self.config.max_entries);
        }

        inner.memory.put(key.clone(), entry.clone());
        inner.persistent.insert(key, entry);
        self.persist(&inner).await;
    }

    /// Drop every entry in both tiers
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.memory.clear();
        inner.persistent.clear();
        self.persist(&inner).await;
    }

    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().await;
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            memory_entries: inner.memory.len(),
            persistent_entries: inner.persistent.len(),
        }
    }

    /// Write the L2 tier atomically (write then rename)
    async fn persist(&self, inner: &CacheInner) {
        let Some(ref path) = self.config.path else {
            return;
        };
        if let Some(parent) = path.parent()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            warn!("Failed to create cache directory: {}", e);
            return;
        }

        let entries: Vec<&CacheEntry> = inner.persistent.values().collect();
        let serialized = match serde_json::to_string(&entries) {
            Ok(serialized) => serialized,
            Err(e) => {
                warn!("Failed to serialize response cache: {}", e);
                return;
            }
        };

        let tmp = path.with_extension("json.tmp");
        if let Err(e) = tokio::fs::write(&tmp, serialized).await {
            warn!("Failed to write response cache: {}", e);
            return;
        }
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            warn!("Failed to publish response cache: {}", e);
        }
    }
}

/// Remove oldest entries until the map holds at most 80 % of `max_entries`
fn evict_oldest(persistent: &mut HashMap<String, CacheEntry>, max_entries: usize) {
    let target = (max_entries * 4) / 5;
    let mut by_age: Vec<(String, DateTime<Utc>)> = persistent
        .iter()
        .map(|(k, e)| (k.clone(), e.timestamp))
        .collect();
    by_age.sort_by_key(|(_, timestamp)| *timestamp);

    let excess = persistent.len().saturating_sub(target);
    for (key, _) in by_age.into_iter().take(excess) {
        persistent.remove(&key);
    }
    debug!("Evicted response cache down to {} entries", persistent.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_config() -> CacheConfig {
        CacheConfig {
            enabled: true,
            max_memory_entries: 4,
            max_entries: 10,
            ttl: Duration::from_secs(3600),
            path: None,
        }
    }

    #[test]
    fn test_key_is_deterministic_and_param_sensitive() {
        let params = ModelParams {
            model: Some("sonnet".to_string()),
            temperature: Some(0.3),
            ..Default::default()
        };
        let a = cache_key("claude", "hello", &params);
        let b = cache_key("claude", "hello", &params.clone());
        assert_eq!(a, b);

        let c = cache_key("claude", "hello", &ModelParams::default());
        assert_ne!(a, c);
        let d = cache_key("gemini", "hello", &params);
        assert_ne!(a, d);
    }

    #[tokio::test]
    async fn test_get_after_put_returns_exact_response() {
        let cache = ResponseCache::open(enabled_config());
        let params = ModelParams::default();
        cache.put("claude", "prompt", &params, "the response").await;
        assert_eq!(
            cache.get("claude", "prompt", &params).await,
            Some("the response".to_string())
        );
    }

    #[tokio::test]
    async fn test_disabled_cache_is_noop() {
        let cache = ResponseCache::open(CacheConfig::default());
        let params = ModelParams::default();
        cache.put("claude", "prompt", &params, "response").await;
        assert_eq!(cache.get("claude", "prompt", &params).await, None);
        let stats = cache.stats().await;
        assert_eq!(stats.persistent_entries, 0);
    }

    #[tokio::test]
    async fn test_set_clear_set_matches_fresh_set() {
        let cache = ResponseCache::open(enabled_config());
        let params = ModelParams::default();
        cache.put("claude", "p", &params, "r").await;
        cache.clear().await;
        cache.put("claude", "p", &params, "r").await;

        let stats = cache.stats().await;
        assert_eq!(stats.persistent_entries, 1);
        assert_eq!(
            cache.get("claude", "p", &params).await,
            Some("r".to_string())
        );
    }

    #[tokio::test]
    async fn test_expired_entries_are_misses() {
        let mut config = enabled_config();
        config.ttl = Duration::from_millis(0);
        let cache = ResponseCache::open(config);
        let params = ModelParams::default();
        cache.put("claude", "p", &params, "r").await;
        assert_eq!(cache.get("claude", "p", &params).await, None);
    }

    #[tokio::test]
    async fn test_l2_eviction_to_eighty_percent() {
        let mut config = enabled_config();
        config.max_entries = 10;
        config.max_memory_entries = 2;
        let cache = ResponseCache::open(config);
        let params = ModelParams::default();

        for i in 0..11 {
            cache
                .put("claude", &format!("prompt-{}", i), &params, "r")
                .await;
            // Keep insertion timestamps strictly ordered.
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let stats = cache.stats().await;
        assert!(stats.persistent_entries <= 9, "{:?}", stats);
        // The newest entry survives eviction.
        assert_eq!(
            cache.get("claude", "prompt-10", &params).await,
            Some("r".to_string())
        );
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("responses.json");
        let params = ModelParams::default();

        let mut config = enabled_config();
        config.path = Some(path.clone());
        let cache = ResponseCache::open(config.clone());
        cache.put("claude", "p", &params, "persisted").await;
        drop(cache);

        let reopened = ResponseCache::open(config);
        assert_eq!(
            reopened.get("claude", "p", &params).await,
            Some("persisted".to_string())
        );
    }

    #[tokio::test]
    async fn test_startup_sweep_drops_expired_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("responses.json");
        let params = ModelParams::default();

        let mut config = enabled_config();
        config.path = Some(path.clone());
        config.ttl = Duration::from_millis(0);
        let cache = ResponseCache::open(config.clone());
        cache.put("claude", "p", &params, "stale").await;
        drop(cache);

        config.ttl = Duration::from_secs(3600);
        let reopened = ResponseCache::open(config);
        let stats = reopened.stats().await;
        assert_eq!(stats.persistent_entries, 0);
    }

    #[tokio::test]
    async fn test_hit_increments_access_count() {
        let cache = ResponseCache::open(enabled_config());
        let params = ModelParams::default();
        cache.put("claude", "p", &params, "r").await;
        cache.get("claude", "p", &params).await;
        cache.get("claude", "p", &params).await;

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 0);
    }
}
