//! Cache store trait definition

use super::errors::CacheResult;
use std::time::Duration;

/// Longest TTL stored with an expiry; longer TTLs are stored without one
pub const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Trait defining cache operations
///
/// Implemented by the concrete backends (in-process, Redis, NoOp). Values are
/// opaque strings; serialization happens in [`CacheFacade`](super::CacheFacade).
/// A `ttl` of `None` means the backend's default TTL.
pub trait CacheStore: Send + Sync {
    /// Get a value from the cache by key
    ///
    /// Returns `Ok(Some(value))` on cache hit, `Ok(None)` on miss or expiry.
    fn get(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = CacheResult<Option<String>>> + Send;

    /// Set a value in the cache, replacing any previous value
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> impl std::future::Future<Output = CacheResult<()>> + Send;

    /// Delete a specific key from the cache
    fn delete(&self, key: &str) -> impl std::future::Future<Output = CacheResult<()>> + Send;

    /// List live keys matching a glob pattern (`*`, `?`)
    fn keys(
        &self,
        pattern: &str,
    ) -> impl std::future::Future<Output = CacheResult<Vec<String>>> + Send;

    /// Delete all keys matching a glob pattern, returning how many were removed
    fn delete_pattern(
        &self,
        pattern: &str,
    ) -> impl std::future::Future<Output = CacheResult<u64>> + Send;

    /// Get several keys at once; the result is positional
    fn batch_get(
        &self,
        keys: &[String],
    ) -> impl std::future::Future<Output = CacheResult<Vec<Option<String>>>> + Send;

    /// Set several entries at once with a shared TTL
    fn batch_set(
        &self,
        entries: &[(String, String)],
        ttl: Option<Duration>,
    ) -> impl std::future::Future<Output = CacheResult<()>> + Send;

    /// Check if the cache backend is healthy
    fn health_check(&self) -> impl std::future::Future<Output = CacheResult<bool>> + Send;

    /// Get the name of the cache provider
    fn provider_name(&self) -> &'static str;

    /// Whether state is shared across process instances
    fn is_distributed(&self) -> bool;
}
