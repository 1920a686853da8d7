//! TTL key/value store with pattern-based bulk invalidation.

use crate::error::CacheResult;
use crate::key::{CacheKey, KeyPattern};
use fleetdesk_types::TenantId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, trace};

/// Deadline used when `now + ttl` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Configuration for the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL for dashboard statistics (ms).
    pub dashboard_ttl_ms: u64,
    /// TTL for generic resource queries (ms).
    pub query_ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dashboard_ttl_ms: 3 * 60 * 1000,
            query_ttl_ms: 5 * 60 * 1000,
        }
    }
}

impl CacheConfig {
    pub fn dashboard_ttl(&self) -> Duration {
        Duration::from_millis(self.dashboard_ttl_ms)
    }

    pub fn query_ttl(&self) -> Duration {
        Duration::from_millis(self.query_ttl_ms)
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses (absent or expired).
    pub misses: u64,
    /// Entries dropped because their TTL elapsed.
    pub expirations: u64,
    /// Entries dropped by explicit or pattern invalidation.
    pub invalidations: u64,
    /// Number of entries currently stored, expired ones included.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
    invalidations: AtomicU64,
}

/// The shared cache of derived query results.
///
/// All mutation goes through this API. Expired entries are never returned;
/// they are evicted lazily on read or in bulk by [`CacheStore::purge_expired`].
#[derive(Debug)]
pub struct CacheStore {
    config: CacheConfig,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    /// Per-key locks that collapse concurrent `get_or_set` misses into one producer run.
    in_flight: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
    counters: Counters,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl CacheStore {
    /// Creates an empty cache.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the value for `key` if present and not expired. An expired
    /// entry is evicted.
    pub async fn get(&self, key: &CacheKey) -> Option<Value> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    trace!(%key, "cache hit");
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => {
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                    trace!(%key, "cache miss");
                    return None;
                }
            }
        }

        // Re-check under the write lock: a concurrent set may have refreshed it.
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(key) {
            if entry.is_live(now) {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            entries.remove(key);
            self.counters.expirations.fetch_add(1, Ordering::Relaxed);
            debug!(%key, "evicted expired cache entry");
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Returns the value for `key` decoded as `T`.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &CacheKey) -> CacheResult<Option<T>> {
        match self.get(key).await {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Inserts or overwrites `key`, expiring `ttl` from now.
    pub async fn set(&self, key: CacheKey, value: Value, ttl: Duration) {
        let now = Instant::now();
        let expires_at = now.checked_add(ttl).unwrap_or_else(|| now + FAR_FUTURE);
        trace!(%key, ttl_ms = ttl.as_millis() as u64, "cache set");
        self.entries
            .write()
            .await
            .insert(key, CacheEntry { value, expires_at });
    }

    /// Serializes `value` and stores it under `key`.
    pub async fn set_from<T: Serialize>(&self, key: CacheKey, value: &T, ttl: Duration) -> CacheResult<()> {
        let value = serde_json::to_value(value)?;
        self.set(key, value, ttl).await;
        Ok(())
    }

    /// Returns the cached value, or runs `producer`, caches its output for
    /// `ttl` and returns it.
    ///
    /// Concurrent misses on the same key wait for the first producer instead
    /// of running their own. A producer error is returned to its caller and
    /// nothing is cached.
    pub async fn get_or_set<F, Fut, E>(&self, key: &CacheKey, ttl: Duration, producer: F) -> Result<Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        let slot = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight.entry(key.clone()).or_default().clone()
        };
        let guard = slot.lock().await;

        let result = match self.peek(key).await {
            Some(value) => Ok(value),
            None => {
                debug!(%key, "cache miss, running producer");
                match producer().await {
                    Ok(value) => {
                        self.set(key.clone(), value.clone(), ttl).await;
                        Ok(value)
                    }
                    Err(e) => Err(e),
                }
            }
        };

        drop(guard);
        let mut in_flight = self.in_flight.lock().await;
        // Only the map and this call still hold the slot: nobody is waiting on it.
        if Arc::strong_count(&slot) <= 2 {
            in_flight.remove(key);
        }
        result
    }

    /// Typed variant of [`CacheStore::get_or_set`].
    pub async fn get_or_set_as<T, F, Fut, E>(&self, key: &CacheKey, ttl: Duration, producer: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<crate::CacheError>,
    {
        let value = self
            .get_or_set(key, ttl, move || async move {
                let produced = producer().await?;
                serde_json::to_value(&produced).map_err(|e| E::from(e.into()))
            })
            .await?;
        serde_json::from_value(value).map_err(|e| E::from(e.into()))
    }

    /// Live lookup that does not touch hit/miss counters.
    async fn peek(&self, key: &CacheKey) -> Option<Value> {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
    }

    /// Removes one entry. Returns whether it existed.
    pub async fn invalidate(&self, key: &CacheKey) -> bool {
        let removed = self.entries.write().await.remove(key).is_some();
        if removed {
            self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
            debug!(%key, "invalidated cache entry");
        }
        removed
    }

    /// Removes every entry matching `pattern`. Returns the number removed.
    pub async fn invalidate_pattern(&self, pattern: &KeyPattern) -> usize {
        self.remove_where(|key| pattern.matches(key), pattern).await
    }

    /// Removes every entry matching the textual pattern
    /// (e.g. `contracts:*:T1`).
    pub async fn invalidate_pattern_str(&self, pattern: &str) -> CacheResult<usize> {
        let pattern = KeyPattern::parse(pattern)?;
        Ok(self.invalidate_pattern(&pattern).await)
    }

    /// Removes every entry belonging to `tenant`.
    pub async fn invalidate_tenant(&self, tenant: &TenantId) -> usize {
        self.remove_where(|key| key.tenant() == tenant, tenant).await
    }

    async fn remove_where<D: std::fmt::Display>(&self, predicate: impl Fn(&CacheKey) -> bool, what: D) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !predicate(key));
        let removed = before - entries.len();
        if removed > 0 {
            self.counters
                .invalidations
                .fetch_add(removed as u64, Ordering::Relaxed);
            debug!(%what, removed, "invalidated cache entries");
        }
        removed
    }

    /// Drops every expired entry. Returns the number removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        let removed = before - entries.len();
        self.counters
            .expirations
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Drops every entry.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Returns a snapshot of the usage counters.
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            entry_count: self.len().await as u64,
        }
    }
}
