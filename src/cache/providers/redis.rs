//! Redis cache provider
//!
//! Uses `redis::aio::ConnectionManager` for async multiplexed connections.
//! Requires the `cache-redis` feature flag.
//!
//! Expiry is delegated to the server: every write uses `SET key value EX ttl`,
//! except a TTL longer than [`MAX_TTL`], which is written without expiry. Batch
//! writes go through one atomic `MULTI`/`EXEC` pipeline. Pattern
//! operations iterate with `SCAN`, never `KEYS`.

use crate::cache::errors::{CacheError, CacheResult};
use crate::cache::providers::redact_url;
use crate::cache::traits::{CacheStore, MAX_TTL};
use crate::config::RedisCacheConfig;
use std::time::Duration;
use tracing::debug;

const SCAN_COUNT: usize = 100;

/// Redis-backed cache service using ConnectionManager
///
/// Provides async multiplexed connections with automatic reconnection.
#[derive(Clone)]
pub struct RedisCacheService {
    connection_manager: redis::aio::ConnectionManager,
    default_ttl: Duration,
}

impl std::fmt::Debug for RedisCacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCacheService")
            .field("connection_manager", &"ConnectionManager")
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl RedisCacheService {
    /// Create a new Redis cache service from configuration
    pub async fn from_config(config: &RedisCacheConfig, default_ttl: Duration) -> CacheResult<Self> {
        let client = redis::Client::open(config.url.as_str()).map_err(|e| {
            CacheError::ConnectionError(format!("Failed to create Redis client: {e}"))
        })?;

        let connect_timeout = Duration::from_secs(config.connection_timeout_seconds.max(1));
        let connection_manager =
            tokio::time::timeout(connect_timeout, redis::aio::ConnectionManager::new(client))
                .await
                .map_err(|_| {
                    CacheError::Timeout(format!(
                        "Redis connection not established within {}s",
                        connect_timeout.as_secs()
                    ))
                })?
                .map_err(|e| {
                    CacheError::ConnectionError(format!("Failed to connect to Redis: {e}"))
                })?;

        debug!(url = %redact_url(&config.url), "Redis cache service connected");

        Ok(Self {
            connection_manager,
            default_ttl,
        })
    }

    /// Server-side TTL in whole seconds; Redis rejects `EX 0`.
    /// `None` when the TTL exceeds [`MAX_TTL`] and the key should not expire.
    fn ttl_seconds(&self, ttl: Option<Duration>) -> Option<u64> {
        expiry_seconds(ttl.unwrap_or(self.default_ttl))
    }

    async fn scan_keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let mut conn = self.connection_manager.clone();
        let mut found = Vec::new();
        let mut cursor: u64 = 0;

        // Use SCAN to iterate without blocking the server
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .map_err(|e| CacheError::BackendError(format!("Redis SCAN failed: {e}")))?;

            found.extend(keys);

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        // SCAN may return a key more than once
        found.sort_unstable();
        found.dedup();
        Ok(found)
    }
}

fn expiry_seconds(ttl: Duration) -> Option<u64> {
    (ttl <= MAX_TTL).then(|| ttl.as_secs().max(1))
}

impl CacheStore for RedisCacheService {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.connection_manager.clone();
        let result: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::BackendError(format!("Redis GET failed: {e}")))?;

        if result.is_some() {
            debug!(key = key, "Cache HIT");
        } else {
            debug!(key = key, "Cache MISS");
        }

        Ok(result)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        let mut conn = self.connection_manager.clone();
        let ttl_seconds = self.ttl_seconds(ttl);

        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(seconds) = ttl_seconds {
            cmd.arg("EX").arg(seconds);
        }
        cmd.query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::BackendError(format!("Redis SET failed: {e}")))?;

        debug!(key = key, ttl_seconds = ?ttl_seconds, "Cache SET");
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.connection_manager.clone();

        redis::cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::BackendError(format!("Redis DEL failed: {e}")))?;

        debug!(key = key, "Cache DEL");
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        self.scan_keys(pattern).await
    }

    async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64> {
        let keys = self.scan_keys(pattern).await?;
        let mut conn = self.connection_manager.clone();
        let mut deleted: u64 = 0;

        for chunk in keys.chunks(SCAN_COUNT) {
            let count: u64 = redis::cmd("DEL")
                .arg(chunk)
                .query_async(&mut conn)
                .await
                .map_err(|e| CacheError::BackendError(format!("Redis DEL (batch) failed: {e}")))?;
            deleted += count;
        }

        debug!(pattern = pattern, deleted = deleted, "Cache pattern DEL");
        Ok(deleted)
    }

    async fn batch_get(&self, keys: &[String]) -> CacheResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.connection_manager.clone();
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::BackendError(format!("Redis MGET failed: {e}")))?;

        debug!(
            requested = keys.len(),
            hits = values.iter().filter(|v| v.is_some()).count(),
            "Cache batch GET"
        );
        Ok(values)
    }

    async fn batch_set(&self, entries: &[(String, String)], ttl: Option<Duration>) -> CacheResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let ttl_seconds = self.ttl_seconds(ttl);
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in entries {
            let cmd = pipe.cmd("SET").arg(key).arg(value);
            if let Some(seconds) = ttl_seconds {
                cmd.arg("EX").arg(seconds);
            }
            cmd.ignore();
        }

        let mut conn = self.connection_manager.clone();
        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::BackendError(format!("Redis pipeline SET failed: {e}")))?;

        debug!(count = entries.len(), ttl_seconds = ?ttl_seconds, "Cache batch SET");
        Ok(())
    }

    async fn health_check(&self) -> CacheResult<bool> {
        let mut conn = self.connection_manager.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::BackendError(format!("Redis PING failed: {e}")))?;

        Ok(pong == "PONG")
    }

    fn provider_name(&self) -> &'static str {
        "redis"
    }

    fn is_distributed(&self) -> bool {
        // Shared across instances; network calls are breaker-protected by the provider
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_url_is_a_connection_error() {
        let config = RedisCacheConfig {
            url: "not a url".to_string(),
            connection_timeout_seconds: 1,
        };
        let result = RedisCacheService::from_config(&config, Duration::from_secs(60)).await;
        assert!(matches!(result, Err(CacheError::ConnectionError(_))));
    }

    #[test]
    fn test_expiry_seconds_bounds() {
        assert_eq!(expiry_seconds(Duration::from_millis(200)), Some(1));
        assert_eq!(expiry_seconds(Duration::from_secs(300)), Some(300));
        assert_eq!(expiry_seconds(MAX_TTL), Some(MAX_TTL.as_secs()));
        assert_eq!(expiry_seconds(MAX_TTL + Duration::from_secs(1)), None);
        assert_eq!(expiry_seconds(Duration::MAX), None);
    }

    // Requires a running Redis instance
    #[cfg(feature = "test-services")]
    mod integration {
        use super::*;
        use tracing::warn;

        fn test_redis_config() -> RedisCacheConfig {
            RedisCacheConfig {
                url: std::env::var("REDIS_URL")
                    .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
                connection_timeout_seconds: 5,
            }
        }

        async fn connect() -> Option<RedisCacheService> {
            match RedisCacheService::from_config(&test_redis_config(), Duration::from_secs(60)).await
            {
                Ok(svc) => Some(svc),
                Err(e) => {
                    warn!("Skipping Redis test (not available): {}", e);
                    None
                }
            }
        }

        #[tokio::test]
        async fn test_redis_crud_and_batch() {
            let Some(svc) = connect().await else { return };
            let prefix = format!("test:{}", uuid::Uuid::new_v4());
            let a = format!("{prefix}:a");
            let b = format!("{prefix}:b");

            svc.batch_set(
                &[(a.clone(), "1".to_string()), (b.clone(), "2".to_string())],
                None,
            )
            .await
            .unwrap();

            let values = svc
                .batch_get(&[a.clone(), format!("{prefix}:missing"), b.clone()])
                .await
                .unwrap();
            assert_eq!(values, vec![Some("1".to_string()), None, Some("2".to_string())]);

            assert_eq!(svc.keys(&format!("{prefix}:*")).await.unwrap().len(), 2);
            assert_eq!(svc.delete_pattern(&format!("{prefix}:*")).await.unwrap(), 2);
            assert_eq!(svc.get(&a).await.unwrap(), None);
        }

        #[tokio::test]
        async fn test_redis_ttl_expiry() {
            let Some(svc) = connect().await else { return };
            let key = format!("test:ttl:{}", uuid::Uuid::new_v4());

            svc.set(&key, "temporary", Some(Duration::from_secs(1)))
                .await
                .unwrap();
            assert!(svc.get(&key).await.unwrap().is_some());

            tokio::time::sleep(Duration::from_millis(1500)).await;
            assert!(svc.get(&key).await.unwrap().is_none());
        }

        #[tokio::test]
        async fn test_redis_ttl_beyond_max_is_persistent() {
            let Some(svc) = connect().await else { return };
            let key = format!("test:persist:{}", uuid::Uuid::new_v4());

            svc.set(&key, "kept", Some(Duration::MAX)).await.unwrap();
            assert_eq!(svc.get(&key).await.unwrap().as_deref(), Some("kept"));
            svc.delete(&key).await.unwrap();
        }
    }
}
