//! Typed caching surface.
//!
//! `CacheFacade` sits on top of a [`CacheProvider`]: it serializes values as
//! JSON, applies the optional global key prefix, resolves TTLs from the
//! [`TtlPolicy`] and implements get-or-compute. Cache failures never reach the
//! caller; a broken cache behaves like an empty one.
//!
//! With single-flight enabled (the default), concurrent misses for one key
//! queue on a per-key async lock so `compute` runs once and the waiters read
//! the freshly stored value.

use super::keys::CacheKey;
use super::pattern::GlobPattern;
use super::provider::CacheProvider;
use super::ttl_policy::{ResourceKind, TtlPolicy};
use crate::config::CacheConfig;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

type InFlightMap = DashMap<String, Arc<Mutex<()>>>;

/// Typed get-or-compute cache
#[derive(Debug)]
pub struct CacheFacade {
    provider: CacheProvider,
    ttl_policy: TtlPolicy,
    key_prefix: Option<String>,
    single_flight: bool,
    in_flight: InFlightMap,
}

/// Removes the in-flight lock for a key once nobody else holds it
struct InFlightSlot<'a> {
    map: &'a InFlightMap,
    key: String,
    lock: Arc<Mutex<()>>,
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        // One reference in the map, one here
        self.map
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) <= 2);
    }
}

impl CacheFacade {
    /// Facade with the built-in TTL table, no prefix, single-flight on
    pub fn new(provider: CacheProvider) -> Self {
        Self {
            provider,
            ttl_policy: TtlPolicy::new(),
            key_prefix: None,
            single_flight: true,
            in_flight: DashMap::new(),
        }
    }

    /// Facade configured from the `cache` section
    pub fn from_config(provider: CacheProvider, config: &CacheConfig) -> Self {
        Self {
            provider,
            ttl_policy: TtlPolicy::from_config(config),
            key_prefix: config.key_prefix.clone(),
            single_flight: config.dedupe_concurrent_misses,
            in_flight: DashMap::new(),
        }
    }

    pub fn with_ttl_policy(mut self, ttl_policy: TtlPolicy) -> Self {
        self.ttl_policy = ttl_policy;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Toggle sharing of in-flight computations between concurrent misses
    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }

    pub fn provider(&self) -> &CacheProvider {
        &self.provider
    }

    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.ttl_policy
    }

    /// TTL for a resource kind
    pub fn ttl_for(&self, kind: ResourceKind) -> Duration {
        self.ttl_policy.ttl_for(kind)
    }

    fn storage_key(&self, key: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{prefix}:{key}"),
            None => key.to_string(),
        }
    }

    /// Read and decode; corrupt entries are deleted and reported as a miss
    async fn read<T: DeserializeOwned>(&self, storage_key: &str) -> Option<T> {
        let raw = match self.provider.get(storage_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = storage_key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = storage_key, error = %e, "Discarding undecodable cache entry");
                if let Err(e) = self.provider.delete(storage_key).await {
                    debug!(key = storage_key, error = %e, "Failed to delete undecodable entry");
                }
                None
            }
        }
    }

    async fn write<T: Serialize>(&self, storage_key: &str, value: &T, ttl: Duration) -> bool {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = storage_key, error = %e, "Value not serializable, skipping cache write");
                return false;
            }
        };

        match self.provider.set(storage_key, &raw, Some(ttl)).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key = storage_key, error = %e, "Cache write failed");
                false
            }
        }
    }

    /// Cached value for `key`, if present and decodable
    pub async fn get<T: DeserializeOwned>(&self, key: impl AsRef<str>) -> Option<T> {
        self.read(&self.storage_key(key.as_ref())).await
    }

    /// Store `value` under `key`; returns whether the write succeeded
    pub async fn set<T: Serialize>(&self, key: impl AsRef<str>, value: &T, ttl: Duration) -> bool {
        self.write(&self.storage_key(key.as_ref()), value, ttl).await
    }

    /// Return the cached value for `key`, or run `compute` and cache its result.
    ///
    /// `compute` is never invoked on a hit. Its errors are returned unchanged
    /// and nothing is cached for them.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: impl AsRef<str>,
        ttl: Duration,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let storage_key = self.storage_key(key.as_ref());

        if let Some(hit) = self.read(&storage_key).await {
            debug!(key = %storage_key, "get_or_compute HIT");
            return Ok(hit);
        }

        if !self.single_flight {
            return self.compute_and_store(&storage_key, ttl, compute).await;
        }

        let lock = self
            .in_flight
            .entry(storage_key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let slot = InFlightSlot {
            map: &self.in_flight,
            key: storage_key.clone(),
            lock,
        };
        let _guard = slot.lock.lock().await;

        // Another caller may have filled the entry while we waited
        if let Some(hit) = self.read(&storage_key).await {
            debug!(key = %storage_key, "get_or_compute HIT after wait");
            return Ok(hit);
        }

        self.compute_and_store(&storage_key, ttl, compute).await
    }

    /// [`get_or_compute`](Self::get_or_compute) with the TTL of `kind`
    pub async fn get_or_compute_for<T, E, F, Fut>(
        &self,
        kind: ResourceKind,
        key: &CacheKey,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.get_or_compute(key, self.ttl_for(kind), compute).await
    }

    async fn compute_and_store<T, E, F, Fut>(
        &self,
        storage_key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        debug!(key = storage_key, "get_or_compute MISS");
        let value = compute().await?;
        self.write(storage_key, &value, ttl).await;
        Ok(value)
    }

    /// Remove one key
    pub async fn invalidate(&self, key: impl AsRef<str>) {
        let storage_key = self.storage_key(key.as_ref());
        if let Err(e) = self.provider.delete(&storage_key).await {
            warn!(key = %storage_key, error = %e, "Cache invalidation failed");
        }
    }

    /// Remove every key matching a glob pattern, returning how many went.
    ///
    /// O(n) in cache size; call it after writes, not on read paths.
    pub async fn invalidate_pattern(&self, pattern: &str) -> u64 {
        let storage_pattern = self.storage_key(pattern);
        if let Err(e) = GlobPattern::new(&storage_pattern) {
            warn!(pattern = %storage_pattern, error = %e, "Rejected invalidation pattern");
            return 0;
        }

        match self.provider.delete_pattern(&storage_pattern).await {
            Ok(removed) => {
                debug!(pattern = %storage_pattern, removed = removed, "Cache pattern invalidated");
                removed
            }
            Err(e) => {
                warn!(pattern = %storage_pattern, error = %e, "Cache pattern invalidation failed");
                0
            }
        }
    }

    /// Remove every key of a domain (`"<domain>:*"`)
    pub async fn invalidate_domain(&self, domain: &str) -> u64 {
        self.invalidate_pattern(&CacheKey::pattern(domain)).await
    }
}
