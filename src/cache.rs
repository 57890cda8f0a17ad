//! Two-tier response cache with TTL support
//!
//! Warm hits are served from an in-process map with zero I/O; a persistent
//! tier (the injected [`KeyValueStore`]) survives process restarts for data
//! that tolerates staleness. The cache is best-effort: persistent-store
//! failures are logged and swallowed, never surfaced, so a cache problem can
//! never fail a request that would otherwise succeed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::store::{keys, KeyValueStore};
use crate::time::Clock;

/// A cached response with its expiry metadata
///
/// Entries are immutable once stored; a refresh replaces the entry wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Opaque response payload
    pub data: Value,
    /// Milliseconds since UNIX epoch at store time
    pub stored_at_ms: u64,
    /// Time-to-live in milliseconds
    pub ttl_ms: u64,
}

impl CacheEntry {
    fn is_fresh(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.stored_at_ms) < self.ttl_ms
    }
}

/// Derive the canonical cache key for a request
///
/// Identical requests with identical parameters always produce the identical
/// key: query parameters are sorted before formatting.
pub fn cache_key(method: &Method, path: &str, params: &[(String, String)]) -> String {
    if params.is_empty() {
        return format!("{method}:{path}");
    }
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort();
    let query: Vec<String> = sorted.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{method}:{path}?{}", query.join("&"))
}

/// Two-tier (in-process + persistent) TTL cache for idempotent responses
pub struct CacheManager {
    memory: RwLock<HashMap<String, CacheEntry>>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl CacheManager {
    /// Create a cache over the injected store and clock
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { memory: RwLock::new(HashMap::new()), store, clock }
    }

    fn storage_key(key: &str) -> String {
        format!("{}{key}", keys::CACHE_PREFIX)
    }

    /// Look up a fresh entry
    ///
    /// Checks the in-process tier first; falls back to the persistent tier,
    /// promoting fresh entries into memory and deleting expired ones. Any
    /// persistent-store error degrades to a miss.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let now_ms = self.clock.millis_since_epoch();

        {
            let memory = self.memory.read().await;
            if let Some(entry) = memory.get(key) {
                if entry.is_fresh(now_ms) {
                    return Some(entry.data.clone());
                }
            }
        }

        let storage_key = Self::storage_key(key);
        let raw = match self.store.get(&storage_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(key, error = %err, "cache read error");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(key, error = %err, "discarding unreadable cache entry");
                return None;
            }
        };

        if entry.is_fresh(now_ms) {
            self.memory.write().await.insert(key.to_string(), entry.clone());
            return Some(entry.data);
        }

        // Expired, clean up the persistent copy.
        if let Err(err) = self.store.remove(&storage_key).await {
            warn!(key, error = %err, "failed to remove expired cache entry");
        }
        None
    }

    /// Look up an entry ignoring TTL
    ///
    /// Offline mode relaxes the freshness requirement: any value still held
    /// in either tier is served rather than failing the request.
    pub async fn get_any(&self, key: &str) -> Option<Value> {
        {
            let memory = self.memory.read().await;
            if let Some(entry) = memory.get(key) {
                return Some(entry.data.clone());
            }
        }

        match self.store.get(&Self::storage_key(key)).await {
            Ok(Some(raw)) => match serde_json::from_str::<CacheEntry>(&raw) {
                Ok(entry) => Some(entry.data),
                Err(err) => {
                    warn!(key, error = %err, "discarding unreadable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(key, error = %err, "cache read error");
                None
            }
        }
    }

    /// Write an entry to both tiers
    ///
    /// The in-process write always succeeds and is the source of truth for
    /// the remainder of the process lifetime; a persistent-store write
    /// failure is non-fatal.
    pub async fn set(&self, key: &str, data: Value, ttl: Duration) {
        let entry = CacheEntry {
            data,
            stored_at_ms: self.clock.millis_since_epoch(),
            ttl_ms: ttl.as_millis() as u64,
        };

        self.memory.write().await.insert(key.to_string(), entry.clone());

        match serde_json::to_string(&entry) {
            Ok(raw) => {
                if let Err(err) = self.store.set(&Self::storage_key(key), &raw).await {
                    warn!(key, error = %err, "cache write error");
                }
            }
            Err(err) => warn!(key, error = %err, "failed to serialize cache entry"),
        }
    }

    /// Remove every key containing the given substring, from both tiers
    pub async fn invalidate(&self, pattern: &str) {
        {
            let mut memory = self.memory.write().await;
            memory.retain(|key, _| !key.contains(pattern));
        }

        let keys = match self.store.list_keys().await {
            Ok(keys) => keys,
            Err(err) => {
                warn!(pattern, error = %err, "cache invalidation error");
                return;
            }
        };

        let matching: Vec<String> = keys
            .into_iter()
            .filter(|k| k.starts_with(keys::CACHE_PREFIX) && k.contains(pattern))
            .collect();

        if matching.is_empty() {
            return;
        }

        debug!(pattern, count = matching.len(), "invalidating cached responses");
        if let Err(err) = self.store.remove_many(&matching).await {
            warn!(pattern, error = %err, "cache invalidation error");
        }
    }

    /// Drop the in-process tier
    ///
    /// Persistent entries remain; they are re-validated against their TTL on
    /// the next lookup.
    pub async fn clear(&self) {
        self.memory.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::testing::{MemoryStore, MockClock};

    fn cache_with_mocks() -> (CacheManager, Arc<MemoryStore>, Arc<MockClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(MockClock::new());
        let cache = CacheManager::new(store.clone(), clock.clone());
        (cache, store, clock)
    }

    #[test]
    fn test_cache_key_is_deterministic() {
        let a = vec![("page".to_string(), "1".to_string()), ("q".to_string(), "milk".to_string())];
        let b = vec![("q".to_string(), "milk".to_string()), ("page".to_string(), "1".to_string())];
        assert_eq!(cache_key(&Method::GET, "/products", &a), cache_key(&Method::GET, "/products", &b));
        assert_eq!(cache_key(&Method::GET, "/products", &[]), "GET:/products");
    }

    #[tokio::test]
    async fn test_fresh_entry_round_trips() {
        let (cache, _, _) = cache_with_mocks();
        cache.set("products", json!({"total": 3}), Duration::from_secs(60)).await;
        assert_eq!(cache.get("products").await, Some(json!({"total": 3})));
    }

    #[tokio::test]
    async fn test_expired_entry_is_removed_from_persistent_tier() {
        let (cache, store, clock) = cache_with_mocks();
        cache.set("products", json!(1), Duration::from_secs(60)).await;

        clock.advance(Duration::from_secs(61));
        assert_eq!(cache.get("products").await, None);
        // Expired persistent copy was cleaned up on read.
        assert!(store.get("cache.products").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_persistent_entry_is_promoted_to_memory() {
        let (cache, store, clock) = cache_with_mocks();
        cache.set("products", json!("warm"), Duration::from_secs(60)).await;

        // Simulate a process restart: memory tier empty, persistent tier kept.
        cache.clear().await;
        assert_eq!(cache.get("products").await, Some(json!("warm")));

        // Promoted copy is now served without touching the store.
        store.fail_reads(true);
        assert_eq!(cache.get("products").await, Some(json!("warm")));
        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get("products").await, Some(json!("warm")));
    }

    #[tokio::test]
    async fn test_get_any_serves_expired_entries() {
        let (cache, _, clock) = cache_with_mocks();
        cache.set("products", json!("stale"), Duration::from_secs(1)).await;
        clock.advance(Duration::from_secs(3600));

        assert_eq!(cache.get("products").await, None);
        assert_eq!(cache.get_any("products").await, Some(json!("stale")));
    }

    #[tokio::test]
    async fn test_store_errors_degrade_to_miss() {
        let (cache, store, _) = cache_with_mocks();
        store.fail_reads(true);
        store.fail_writes(true);

        cache.set("products", json!(1), Duration::from_secs(60)).await;
        // Memory tier still works despite the failing persistent tier.
        assert_eq!(cache.get("products").await, Some(json!(1)));

        cache.clear().await;
        assert_eq!(cache.get("products").await, None);
    }

    #[tokio::test]
    async fn test_invalidate_matches_substring_in_both_tiers() {
        let (cache, store, _) = cache_with_mocks();
        cache.set("GET:/products?page=1", json!(1), Duration::from_secs(60)).await;
        cache.set("GET:/products/42", json!(2), Duration::from_secs(60)).await;
        cache.set("GET:/cart", json!(3), Duration::from_secs(60)).await;

        cache.invalidate("products").await;

        assert_eq!(cache.get("GET:/products?page=1").await, None);
        assert_eq!(cache.get("GET:/products/42").await, None);
        assert_eq!(cache.get("GET:/cart").await, Some(json!(3)));

        let remaining = store.list_keys().await.unwrap();
        assert!(remaining.iter().all(|k| !k.contains("products")));
        assert!(remaining.iter().any(|k| k.contains("cart")));
    }

    #[tokio::test]
    async fn test_invalidate_leaves_non_cache_keys_alone() {
        let (cache, store, _) = cache_with_mocks();
        store.set("auth.tokens", "{\"products\":true}").await.unwrap();
        cache.set("GET:/products", json!(1), Duration::from_secs(60)).await;

        cache.invalidate("").await;

        let remaining = store.list_keys().await.unwrap();
        assert_eq!(remaining, vec!["auth.tokens".to_string()]);
    }
}
