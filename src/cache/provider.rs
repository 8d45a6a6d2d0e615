//! Cache provider with integrated circuit breaker
//!
//! Uses enum dispatch for zero-cost abstraction: the backend is chosen once at
//! startup from configuration and every call site goes through `CacheProvider`.
//! Circuit breaker protection is an internal detail; consumers get fail-fast
//! behavior when a distributed backend is unavailable.

use super::errors::{CacheError, CacheResult};
use super::providers::{MemoryCacheService, NoOpCacheService};
use super::traits::CacheStore;
use crate::config::{CacheBackendKind, CacheConfig};
use crate::resilience::{CircuitBreaker, CircuitBreakerError, CircuitState};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[cfg(feature = "cache-redis")]
use super::providers::RedisCacheService;

/// Internal cache backend enum for zero-cost dispatch
#[derive(Debug, Clone)]
enum CacheBackend {
    /// Redis cache provider (boxed to reduce enum size)
    #[cfg(feature = "cache-redis")]
    Redis(Box<RedisCacheService>),

    /// Bounded in-process cache
    Memory(Box<MemoryCacheService>),

    /// No-op cache provider (always miss, always succeed)
    NoOp(NoOpCacheService),
}

macro_rules! dispatch {
    ($backend:expr, $s:ident => $call:expr) => {
        match $backend {
            #[cfg(feature = "cache-redis")]
            CacheBackend::Redis($s) => $call,
            CacheBackend::Memory($s) => $call,
            CacheBackend::NoOp($s) => $call,
        }
    };
}

impl CacheBackend {
    fn is_distributed(&self) -> bool {
        dispatch!(self, s => s.is_distributed())
    }

    fn provider_name(&self) -> &'static str {
        dispatch!(self, s => s.provider_name())
    }

    fn is_enabled(&self) -> bool {
        !matches!(self, Self::NoOp(_))
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        dispatch!(self, s => s.get(key).await)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        dispatch!(self, s => s.set(key, value, ttl).await)
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        dispatch!(self, s => s.delete(key).await)
    }

    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        dispatch!(self, s => s.keys(pattern).await)
    }

    async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64> {
        dispatch!(self, s => s.delete_pattern(pattern).await)
    }

    async fn batch_get(&self, keys: &[String]) -> CacheResult<Vec<Option<String>>> {
        dispatch!(self, s => s.batch_get(keys).await)
    }

    async fn batch_set(&self, entries: &[(String, String)], ttl: Option<Duration>) -> CacheResult<()> {
        dispatch!(self, s => s.batch_set(entries, ttl).await)
    }

    async fn health_check(&self) -> CacheResult<bool> {
        dispatch!(self, s => s.health_check().await)
    }
}

/// Cache provider with integrated circuit breaker protection
///
/// ## Backends
///
/// - **Redis/Dragonfly**: distributed cache for multi-instance deployments
/// - **Memory**: bounded in-process cache with TTL expiry
/// - **NoOp**: always-miss fallback when caching is disabled
///
/// ## Circuit Breaker
///
/// When a breaker is attached (by default only for distributed backends):
///
/// - While open: `get()` returns `Ok(None)`, writes and deletes return `Ok(())`,
///   `keys()`/`batch_get()` return empty results, `health_check()` returns `Ok(false)`
/// - Each backend call runs under the breaker's request timeout
/// - Recovery happens automatically through the breaker's HALF_OPEN probe
#[derive(Clone)]
pub struct CacheProvider {
    backend: CacheBackend,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
}

impl std::fmt::Debug for CacheProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheProvider")
            .field("backend", &self.backend)
            .field(
                "circuit_breaker",
                &self.circuit_breaker.as_ref().map(|cb| cb.state()),
            )
            .finish()
    }
}

impl CacheProvider {
    /// Create a cache provider from configuration with graceful degradation
    ///
    /// If Redis is configured but cannot be reached, logs a warning and falls
    /// back to the in-process backend. The system never fails to start due to
    /// cache issues. `circuit_breaker` is attached only when the resulting
    /// backend is distributed.
    pub async fn from_config_graceful(
        config: &CacheConfig,
        circuit_breaker: Option<Arc<CircuitBreaker>>,
    ) -> Self {
        let backend = Self::create_backend(config).await;

        let circuit_breaker = if backend.is_distributed() && backend.is_enabled() {
            circuit_breaker.inspect(|cb| {
                info!(
                    component = %cb.name(),
                    failure_threshold = cb.config().failure_threshold,
                    request_timeout_ms = cb.config().request_timeout.as_millis() as u64,
                    "Cache circuit breaker attached"
                );
            })
        } else {
            None
        };

        Self {
            backend,
            circuit_breaker,
        }
    }

    /// Create the cache backend from configuration
    async fn create_backend(config: &CacheConfig) -> CacheBackend {
        if !config.enabled {
            info!("Cache disabled by configuration");
            return CacheBackend::NoOp(NoOpCacheService::new());
        }

        match config.backend_kind() {
            Ok(CacheBackendKind::Redis) => Self::create_redis_backend(config).await,
            Ok(CacheBackendKind::Memory) => Self::create_memory_backend(config),
            Ok(CacheBackendKind::NoOp) => CacheBackend::NoOp(NoOpCacheService::new()),
            Err(e) => {
                warn!(error = %e, "Unknown cache backend, falling back to NoOp");
                CacheBackend::NoOp(NoOpCacheService::new())
            }
        }
    }

    /// Attempt to create a Redis backend, falling back to memory on failure
    #[cfg(feature = "cache-redis")]
    async fn create_redis_backend(config: &CacheConfig) -> CacheBackend {
        match RedisCacheService::from_config(&config.redis, config.default_ttl()).await {
            Ok(service) => {
                info!(backend = "redis", "Distributed cache provider initialized successfully");
                CacheBackend::Redis(Box::new(service))
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to connect to Redis, falling back to in-memory cache (graceful degradation)"
                );
                Self::create_memory_backend(config)
            }
        }
    }

    /// Fallback when cache-redis feature is not enabled
    #[cfg(not(feature = "cache-redis"))]
    async fn create_redis_backend(config: &CacheConfig) -> CacheBackend {
        warn!("Redis cache backend requested but 'cache-redis' feature not enabled, using in-memory cache");
        Self::create_memory_backend(config)
    }

    fn create_memory_backend(config: &CacheConfig) -> CacheBackend {
        let service = MemoryCacheService::from_config(&config.memory, config.default_ttl());
        info!(
            backend = "memory",
            max_size = config.memory.max_size,
            eviction = ?config.memory.eviction,
            ttl_seconds = config.default_ttl_seconds,
            "In-memory cache provider initialized successfully"
        );
        CacheBackend::Memory(Box::new(service))
    }

    /// Create a NoOp provider (for explicit opt-out or testing)
    pub fn noop() -> Self {
        Self {
            backend: CacheBackend::NoOp(NoOpCacheService::new()),
            circuit_breaker: None,
        }
    }

    /// Wrap an existing in-process cache
    pub fn memory(service: MemoryCacheService) -> Self {
        Self {
            backend: CacheBackend::Memory(Box::new(service)),
            circuit_breaker: None,
        }
    }

    /// Route every backend call through `circuit_breaker`
    pub fn with_circuit_breaker(mut self, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = Some(circuit_breaker);
        self
    }

    /// Check if caching is actually enabled (not NoOp)
    pub fn is_enabled(&self) -> bool {
        self.backend.is_enabled()
    }

    /// Whether state is shared across process instances
    pub fn is_distributed(&self) -> bool {
        self.backend.is_distributed()
    }

    /// Get the provider name
    pub fn provider_name(&self) -> &'static str {
        self.backend.provider_name()
    }

    /// The in-process backend, if that is the one in use
    pub fn as_memory(&self) -> Option<&MemoryCacheService> {
        match &self.backend {
            CacheBackend::Memory(s) => Some(s),
            _ => None,
        }
    }

    /// Get current circuit breaker state (for monitoring)
    ///
    /// Returns `None` if no circuit breaker is attached.
    pub fn circuit_state(&self) -> Option<CircuitState> {
        self.circuit_breaker.as_ref().map(|cb| cb.state())
    }

    /// Run `call` through the breaker, substituting `on_open` when it rejects
    async fn guarded<T, F, Fut>(&self, operation: &'static str, on_open: T, call: F) -> CacheResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheResult<T>>,
    {
        let Some(cb) = &self.circuit_breaker else {
            return call().await;
        };

        match cb.execute(call).await {
            Ok(value) => Ok(value),
            Err(CircuitBreakerError::CircuitOpen(info)) => {
                debug!(
                    operation = operation,
                    retry_after_secs = info.retry_after_secs,
                    "Cache circuit open, skipping backend call"
                );
                Ok(on_open)
            }
            Err(CircuitBreakerError::Timeout { timeout_ms, .. }) => Err(CacheError::Timeout(
                format!("cache {operation} exceeded {timeout_ms}ms"),
            )),
            Err(CircuitBreakerError::OperationFailed(e)) => Err(e),
        }
    }

    /// Get a value from cache
    ///
    /// If circuit is open, returns `Ok(None)` (cache miss behavior).
    pub async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.guarded("get", None, || self.backend.get(key)).await
    }

    /// Set a value in cache; `None` uses the backend's default TTL
    ///
    /// If circuit is open, returns `Ok(())` (no-op behavior).
    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        self.guarded("set", (), || self.backend.set(key, value, ttl))
            .await
    }

    /// Delete a specific key
    ///
    /// If circuit is open, returns `Ok(())` (no-op behavior).
    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        self.guarded("delete", (), || self.backend.delete(key)).await
    }

    /// List keys matching a glob pattern
    pub async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        self.guarded("keys", Vec::new(), || self.backend.keys(pattern))
            .await
    }

    /// Delete keys matching a glob pattern
    ///
    /// Scans the whole key space; keep it off latency-sensitive paths.
    /// If circuit is open, returns `Ok(0)` (no-op behavior).
    pub async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64> {
        self.guarded("delete_pattern", 0, || self.backend.delete_pattern(pattern))
            .await
    }

    /// Get several keys; the result is positional
    ///
    /// If circuit is open, every key misses.
    pub async fn batch_get(&self, keys: &[String]) -> CacheResult<Vec<Option<String>>> {
        self.guarded("batch_get", vec![None; keys.len()], || {
            self.backend.batch_get(keys)
        })
        .await
    }

    /// Set several entries with a shared TTL
    pub async fn batch_set(
        &self,
        entries: &[(String, String)],
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        self.guarded("batch_set", (), || self.backend.batch_set(entries, ttl))
            .await
    }

    /// Health check the cache backend
    ///
    /// If circuit is open, returns `Ok(false)` (unhealthy).
    pub async fn health_check(&self) -> CacheResult<bool> {
        self.guarded("health_check", false, || self.backend.health_check())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvictionPolicy;
    use crate::resilience::CircuitBreakerConfig;

    fn memory_provider() -> CacheProvider {
        CacheProvider::memory(MemoryCacheService::new(
            100,
            Duration::from_secs(60),
            EvictionPolicy::Fifo,
        ))
    }

    fn cache_breaker() -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            "cache",
            CircuitBreakerConfig {
                failure_threshold: 2,
                success_threshold: 1,
                reset_timeout: Duration::from_secs(30),
                request_timeout: Duration::from_secs(1),
            },
        ))
    }

    #[tokio::test]
    async fn test_noop_provider_is_not_enabled() {
        let provider = CacheProvider::noop();
        assert!(!provider.is_enabled());
        assert_eq!(provider.provider_name(), "noop");
        assert!(provider.circuit_state().is_none());
    }

    #[tokio::test]
    async fn test_from_config_disabled() {
        let config = CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        };
        let provider = CacheProvider::from_config_graceful(&config, None).await;
        assert!(!provider.is_enabled());
    }

    #[tokio::test]
    async fn test_from_config_unknown_backend() {
        let config = CacheConfig {
            backend: "unknown_backend".to_string(),
            ..CacheConfig::default()
        };
        let provider = CacheProvider::from_config_graceful(&config, None).await;
        assert!(!provider.is_enabled());
    }

    #[tokio::test]
    async fn test_from_config_memory_has_no_breaker() {
        let config = CacheConfig {
            backend: "in-memory".to_string(),
            ..CacheConfig::default()
        };
        let provider = CacheProvider::from_config_graceful(&config, Some(cache_breaker())).await;
        assert!(provider.is_enabled());
        assert_eq!(provider.provider_name(), "memory");
        assert!(!provider.is_distributed());
        assert!(provider.circuit_state().is_none());
        assert!(provider.as_memory().is_some());
    }

    #[tokio::test]
    async fn test_unreachable_redis_falls_back_to_memory() {
        let mut config = CacheConfig {
            backend: "redis".to_string(),
            ..CacheConfig::default()
        };
        config.redis.url = "redis://127.0.0.1:1".to_string();
        config.redis.connection_timeout_seconds = 1;

        let provider = CacheProvider::from_config_graceful(&config, Some(cache_breaker())).await;
        assert!(provider.is_enabled());
        assert_eq!(provider.provider_name(), "memory");
        assert!(provider.circuit_state().is_none());
    }

    #[tokio::test]
    async fn test_round_trip_through_provider() {
        let provider = memory_provider();
        provider
            .set("products:detail:{\"id\":1}", "{\"name\":\"lamp\"}", None)
            .await
            .unwrap();
        assert_eq!(
            provider.get("products:detail:{\"id\":1}").await.unwrap(),
            Some("{\"name\":\"lamp\"}".to_string())
        );

        provider
            .batch_set(
                &[
                    ("orders:a".to_string(), "1".to_string()),
                    ("orders:b".to_string(), "2".to_string()),
                ],
                Some(Duration::from_secs(30)),
            )
            .await
            .unwrap();
        assert_eq!(provider.keys("orders:*").await.unwrap().len(), 2);
        assert_eq!(provider.delete_pattern("orders:*").await.unwrap(), 2);
        assert!(provider.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_open_circuit_degrades_to_miss_and_noop() {
        let cb = cache_breaker();
        let provider = memory_provider().with_circuit_breaker(cb.clone());
        provider.set("settings:site", "v1", None).await.unwrap();

        cb.force_state(CircuitState::Open);
        assert_eq!(provider.circuit_state(), Some(CircuitState::Open));

        assert_eq!(provider.get("settings:site").await.unwrap(), None);
        provider.set("settings:site", "v2", None).await.unwrap();
        provider.delete("settings:site").await.unwrap();
        assert_eq!(provider.delete_pattern("settings:*").await.unwrap(), 0);
        assert!(provider.keys("*").await.unwrap().is_empty());
        assert_eq!(
            provider
                .batch_get(&["settings:site".to_string(), "x".to_string()])
                .await
                .unwrap(),
            vec![None, None]
        );
        assert!(!provider.health_check().await.unwrap());

        // Nothing reached the backend while open
        cb.force_state(CircuitState::Closed);
        assert_eq!(
            provider.get("settings:site").await.unwrap(),
            Some("v1".to_string())
        );
        assert_eq!(cb.get_status().stats.rejected_requests, 7);
    }
}
