//! No-op cache provider
//!
//! Always returns None/success. Used when caching is disabled by
//! configuration.

use crate::cache::errors::CacheResult;
use crate::cache::traits::CacheStore;
use std::time::Duration;

/// No-op cache service that never caches anything
///
/// All reads miss, all writes succeed silently.
#[derive(Debug, Clone, Default)]
pub struct NoOpCacheService;

impl NoOpCacheService {
    /// Create a new no-op cache service
    pub fn new() -> Self {
        Self
    }
}

impl CacheStore for NoOpCacheService {
    async fn get(&self, _key: &str) -> CacheResult<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> CacheResult<()> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> CacheResult<()> {
        Ok(())
    }

    async fn keys(&self, _pattern: &str) -> CacheResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn delete_pattern(&self, _pattern: &str) -> CacheResult<u64> {
        Ok(0)
    }

    async fn batch_get(&self, keys: &[String]) -> CacheResult<Vec<Option<String>>> {
        Ok(vec![None; keys.len()])
    }

    async fn batch_set(
        &self,
        _entries: &[(String, String)],
        _ttl: Option<Duration>,
    ) -> CacheResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "noop"
    }

    fn is_distributed(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_reads_miss_after_write() {
        let svc = NoOpCacheService::new();
        svc.set("key", "value", Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(svc.get("key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_noop_batch_get_is_positional() {
        let svc = NoOpCacheService::new();
        let keys = vec!["a".to_string(), "b".to_string()];
        assert_eq!(svc.batch_get(&keys).await.unwrap(), vec![None, None]);
    }

    #[tokio::test]
    async fn test_noop_pattern_operations() {
        let svc = NoOpCacheService::new();
        assert!(svc.keys("prefix:*").await.unwrap().is_empty());
        assert_eq!(svc.delete_pattern("prefix:*").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_noop_health_and_name() {
        let svc = NoOpCacheService::new();
        assert!(svc.health_check().await.unwrap());
        assert_eq!(svc.provider_name(), "noop");
    }
}
