//! Startup and shutdown of the shared resilience components.

use crate::cache::{CacheFacade, CacheProvider};
use crate::config::{CacheBackendKind, ConfigManager, GuardConfig};
use crate::error::{GuardError, Result};
use crate::logging::log_resilience_operation;
use crate::notify::{NotificationTransport, ProtectedClient, ProtectedNotifier};
use crate::resilience::{
    components, events, CircuitBreakerRegistry, CircuitState, RetryPolicy,
    SystemCircuitBreakerStatus,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

/// Shared resilience dependencies
///
/// Built once at startup and passed by reference to every call site:
/// - Circuit breaker registry
/// - Cache facade over the configured backend
/// - Retry policy for idempotent sends
pub struct ResilienceSystem {
    /// System instance ID
    pub system_id: Uuid,

    config_manager: Arc<ConfigManager>,
    registry: Arc<CircuitBreakerRegistry>,
    cache: Arc<CacheFacade>,
    retry_policy: RetryPolicy,
    background_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for ResilienceSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilienceSystem")
            .field("system_id", &self.system_id)
            .field("environment", &self.config_manager.environment())
            .field("circuit_breakers", &self.registry.len())
            .field("cache_provider", &self.cache.provider().provider_name())
            .field("background_tasks", &self.background_tasks.lock().len())
            .finish()
    }
}

/// Point-in-time health of the whole system
#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub circuit_breakers: SystemCircuitBreakerStatus,
    pub cache_provider: &'static str,
    pub cache_healthy: bool,
    pub cache_circuit: Option<CircuitState>,
}

impl SystemHealth {
    pub fn is_healthy(&self) -> bool {
        self.cache_healthy && self.circuit_breakers.unhealthy_circuits().is_empty()
    }
}

impl ResilienceSystem {
    /// Build with environment-aware configuration loading
    pub async fn new() -> Result<Self> {
        info!("Initializing ResilienceSystem with auto-detected environment configuration");
        let config_manager = ConfigManager::load()?;
        Self::from_config_manager(config_manager).await
    }

    /// Build from an already loaded configuration
    pub async fn from_config(config: &GuardConfig) -> Result<Self> {
        let environment = ConfigManager::detect_environment();
        let config_manager = ConfigManager::from_config(config.clone(), &environment)?;
        Self::from_config_manager(config_manager).await
    }

    pub async fn from_config_manager(config_manager: Arc<ConfigManager>) -> Result<Self> {
        let config = config_manager.config();
        config.validate()?;

        let registry = Arc::new(CircuitBreakerRegistry::from_config(&config.circuit_breakers));
        let mut background_tasks = vec![events::spawn_transition_logger(registry.subscribe())];

        let cache_breaker = (registry.is_enabled()
            && config.cache.enabled
            && config.cache.backend_kind()? == CacheBackendKind::Redis)
            .then(|| registry.get_circuit_breaker(components::CACHE));
        let provider = CacheProvider::from_config_graceful(&config.cache, cache_breaker).await;

        if let Some(memory) = provider.as_memory() {
            let interval = config.cache.memory.sweep_interval_seconds;
            if interval > 0 {
                background_tasks.push(memory.spawn_sweeper(Duration::from_secs(interval)));
            }
        }

        let cache = Arc::new(CacheFacade::from_config(provider, &config.cache));
        let retry_policy = RetryPolicy::from_config(&config.retry);

        let system = Self {
            system_id: Uuid::new_v4(),
            config_manager,
            registry,
            cache,
            retry_policy,
            background_tasks: Mutex::new(background_tasks),
        };

        info!(
            system_id = %system.system_id,
            environment = %system.config_manager.environment(),
            cache_provider = system.cache.provider().provider_name(),
            circuit_breakers_enabled = system.registry.is_enabled(),
            "ResilienceSystem initialized"
        );
        Ok(system)
    }

    pub fn config(&self) -> &GuardConfig {
        self.config_manager.config()
    }

    pub fn config_manager(&self) -> &Arc<ConfigManager> {
        &self.config_manager
    }

    pub fn registry(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<CacheFacade> {
        &self.cache
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Notifier for `transport`, protected by its channel's breaker
    pub fn notifier(&self, transport: Arc<dyn NotificationTransport>) -> ProtectedNotifier {
        ProtectedNotifier::from_registry(transport, &self.registry, self.retry_policy.clone())
    }

    /// Protected client for a request/response upstream
    pub fn client(&self, component: &str) -> ProtectedClient {
        ProtectedClient::from_registry(&self.registry, component)
    }

    /// Administrative override of one breaker's state
    pub fn force_state(&self, component: &str, state: CircuitState) -> Result<()> {
        if !self.registry.force_state(component, state) {
            return Err(GuardError::UnknownComponent(component.to_string()));
        }
        log_resilience_operation("force_state", component, "ok", Some(state.to_string().as_str()));
        Ok(())
    }

    /// Close every breaker and clear its statistics
    pub fn reset_all(&self) {
        self.registry.reset_all();
        log_resilience_operation("reset_all", "registry", "ok", None);
    }

    pub async fn health(&self) -> SystemHealth {
        let provider = self.cache.provider();
        let cache_healthy = match provider.health_check().await {
            Ok(healthy) => healthy,
            Err(e) => {
                debug!(error = %e, "Cache health check failed");
                false
            }
        };

        SystemHealth {
            circuit_breakers: self.registry.system_status(),
            cache_provider: provider.provider_name(),
            cache_healthy,
            cache_circuit: provider.circuit_state(),
        }
    }

    /// Stop background tasks and drop in-process cache contents
    pub fn shutdown(&self) {
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.background_tasks.lock());
        let stopped = tasks.len();
        for task in tasks {
            task.abort();
        }

        if let Some(memory) = self.cache.provider().as_memory() {
            memory.clear();
        }

        info!(
            system_id = %self.system_id,
            background_tasks = stopped,
            summary = %self.registry.system_status().format_summary(),
            "ResilienceSystem shut down"
        );
        log_resilience_operation("shutdown", "system", "ok", None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::CircuitBreakerError;

    #[tokio::test]
    async fn test_default_system_uses_memory_cache() {
        let system = ResilienceSystem::from_config(&GuardConfig::default())
            .await
            .unwrap();

        assert_eq!(system.cache().provider().provider_name(), "memory");
        assert!(system.cache().provider().circuit_state().is_none());
        // Memory backends never register the cache breaker
        assert!(system.registry().get(components::CACHE).is_none());
        assert_eq!(system.background_tasks.lock().len(), 2);

        let health = system.health().await;
        assert!(health.is_healthy());
        assert_eq!(health.cache_provider, "memory");

        system.shutdown();
        assert!(system.background_tasks.lock().is_empty());
    }

    #[tokio::test]
    async fn test_force_state_unknown_component() {
        let system = ResilienceSystem::from_config(&GuardConfig::default())
            .await
            .unwrap();

        let err = system.force_state("payments", CircuitState::Open).unwrap_err();
        assert!(matches!(err, GuardError::UnknownComponent(name) if name == "payments"));

        let ai = system.client(components::AI_SERVICE);
        system.force_state(components::AI_SERVICE, CircuitState::Open).unwrap();
        assert_eq!(ai.state(), CircuitState::Open);
        assert!(!system.health().await.is_healthy());

        system.reset_all();
        assert_eq!(ai.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = GuardConfig::default();
        config.cache.backend = "memcached".to_string();

        let err = ResilienceSystem::from_config(&config).await.unwrap_err();
        assert!(matches!(err, GuardError::Configuration(_)));

        let mut config = GuardConfig::default();
        config.cache.default_ttl_seconds = u64::MAX;
        let err = ResilienceSystem::from_config(&config).await.unwrap_err();
        assert!(matches!(err, GuardError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_disabled_breakers_let_calls_through() {
        let mut config = GuardConfig::default();
        config.circuit_breakers.enabled = false;
        let system = ResilienceSystem::from_config(&config).await.unwrap();

        let ai = system.client(components::AI_SERVICE);
        for _ in 0..3 {
            let result = ai.call(|| async { Err::<String, _>("model overloaded") }).await;
            assert!(matches!(result, Err(CircuitBreakerError::OperationFailed(_))));
        }
        assert_eq!(ai.state(), CircuitState::Closed);

        let text = ai
            .call(|| async { Ok::<_, String>("A warm brass lamp".to_string()) })
            .await
            .unwrap();
        assert_eq!(text, "A warm brass lamp");
        assert!(system.health().await.is_healthy());
    }

    #[tokio::test]
    async fn test_shutdown_clears_memory_cache() {
        let system = ResilienceSystem::from_config(&GuardConfig::default())
            .await
            .unwrap();
        system
            .cache()
            .set("settings:site", &"v1", Duration::from_secs(60))
            .await;
        assert_eq!(system.cache().provider().as_memory().unwrap().len(), 1);

        system.shutdown();
        assert!(system.cache().provider().as_memory().unwrap().is_empty());
    }
}
