//! # Upstream Guard Configuration System
//!
//! Layered configuration for circuit breakers, caching and retries.
//!
//! ## Architecture
//!
//! - **Built-in defaults**: every field has a production-sensible default, so an
//!   empty directory yields a working configuration
//! - **Environment awareness**: `upstream-guard.toml` is overlaid by
//!   `upstream-guard.<env>.toml`, then by `UPSTREAM_GUARD__*` variables
//! - **Explicit validation**: the merged result is validated before use
//!
//! ## Usage
//!
//! ```rust,no_run
//! use upstream_guard::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let email = manager
//!     .config()
//!     .circuit_breakers
//!     .config_for_component("email-service");
//! assert_eq!(email.failure_threshold, 3);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::resilience::components;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring `upstream-guard.toml`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Circuit breaker registry settings
    pub circuit_breakers: CircuitBreakerConfig,

    /// Cache backend and facade settings
    pub cache: CacheConfig,

    /// Retry policy applied to notification delivery
    pub retry: RetryConfig,
}

/// Circuit breaker configuration integrated with TOML config
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Whether circuit breakers are enabled globally
    pub enabled: bool,

    /// Global circuit breaker settings
    pub global_settings: CircuitBreakerGlobalSettings,

    /// Default configuration for components without an entry
    pub default_config: CircuitBreakerComponentConfig,

    /// Specific configurations for named components
    pub component_configs: HashMap<String, CircuitBreakerComponentConfig>,
}

/// Global circuit breaker settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerGlobalSettings {
    /// Soft limit on registered breakers; exceeding it logs a warning
    pub max_circuit_breakers: usize,
}

/// Circuit breaker configuration for a specific component
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CircuitBreakerComponentConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,

    /// Consecutive half-open successes to close the circuit
    pub success_threshold: u32,

    /// Time to stay open before re-probing (in seconds)
    pub reset_timeout_seconds: u64,

    /// Per-attempt deadline (in seconds)
    pub request_timeout_seconds: u64,
}

impl CircuitBreakerConfig {
    /// Get configuration for a specific component
    pub fn config_for_component(&self, component_name: &str) -> CircuitBreakerComponentConfig {
        self.component_configs
            .get(component_name)
            .cloned()
            .unwrap_or_else(|| self.default_config.clone())
    }

    /// Validate every component entry
    pub fn validate(&self) -> ConfigResult<()> {
        if self.global_settings.max_circuit_breakers == 0 {
            return Err(ConfigurationError::invalid_value(
                "circuit_breakers.global_settings.max_circuit_breakers",
                "0",
                "must be greater than 0",
            ));
        }

        let entries = std::iter::once(("default_config", &self.default_config)).chain(
            self.component_configs
                .iter()
                .map(|(name, cfg)| (name.as_str(), cfg)),
        );

        for (name, component) in entries {
            component.to_resilience_config().validate().map_err(|reason| {
                ConfigurationError::invalid_value(
                    format!("circuit_breakers.{name}"),
                    format!("{component:?}"),
                    reason,
                )
            })?;
        }

        Ok(())
    }
}

impl CircuitBreakerComponentConfig {
    /// Convert to resilience module's format
    pub fn to_resilience_config(&self) -> crate::resilience::CircuitBreakerConfig {
        crate::resilience::CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            reset_timeout: Duration::from_secs(self.reset_timeout_seconds),
            request_timeout: Duration::from_secs(self.request_timeout_seconds),
        }
    }

    /// Convert from resilience module's format (whole seconds)
    pub fn from_resilience_config(config: &crate::resilience::CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            success_threshold: config.success_threshold,
            reset_timeout_seconds: config.reset_timeout.as_secs(),
            request_timeout_seconds: config.request_timeout.as_secs(),
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        let component_configs = [
            components::AI_SERVICE,
            components::MEDIA_SERVICE,
            components::EMAIL_SERVICE,
            components::WHATSAPP_SERVICE,
            components::CACHE,
        ]
        .into_iter()
        .filter_map(|name| {
            crate::resilience::CircuitBreakerConfig::preset_for(name).map(|preset| {
                (
                    name.to_string(),
                    CircuitBreakerComponentConfig::from_resilience_config(&preset),
                )
            })
        })
        .collect();

        Self {
            enabled: true,
            global_settings: CircuitBreakerGlobalSettings::default(),
            default_config: CircuitBreakerComponentConfig::default(),
            component_configs,
        }
    }
}

impl Default for CircuitBreakerGlobalSettings {
    fn default() -> Self {
        Self {
            max_circuit_breakers: 50,
        }
    }
}

impl Default for CircuitBreakerComponentConfig {
    fn default() -> Self {
        Self::from_resilience_config(&crate::resilience::CircuitBreakerConfig::default())
    }
}

/// Cache backend selected once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackendKind {
    Memory,
    Redis,
    NoOp,
}

impl CacheBackendKind {
    /// Parse a backend name, accepting the common aliases
    pub fn parse(name: &str) -> ConfigResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "memory" | "in-memory" | "in_memory" => Ok(Self::Memory),
            "redis" | "dragonfly" => Ok(Self::Redis),
            "noop" | "none" | "disabled" => Ok(Self::NoOp),
            other => Err(ConfigurationError::UnknownBackend {
                backend: other.to_string(),
            }),
        }
    }
}

/// Entry eviction policy for the in-process backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Evict the earliest-inserted entry; reads do not affect order
    #[default]
    Fifo,
    /// Evict the least-recently read or written entry
    Lru,
}

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether caching is enabled (disabled selects the no-op backend)
    pub enabled: bool,

    /// Backend name: `memory`, `redis` or `noop`
    pub backend: String,

    /// TTL used when a write does not specify one
    pub default_ttl_seconds: u64,

    /// Optional namespace prepended to every key (`<prefix>:<key>`)
    pub key_prefix: Option<String>,

    /// Share one in-flight computation between concurrent misses of a key
    pub dedupe_concurrent_misses: bool,

    /// In-process backend settings
    pub memory: MemoryCacheConfig,

    /// Remote backend settings
    pub redis: RedisCacheConfig,

    /// Per-resource TTL overrides, keyed by resource name (e.g. `product_listing`)
    pub ttl_overrides: HashMap<String, u64>,
}

impl CacheConfig {
    /// Default TTL as a `Duration`
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }

    /// Parsed backend kind
    pub fn backend_kind(&self) -> ConfigResult<CacheBackendKind> {
        CacheBackendKind::parse(&self.backend)
    }

    /// Validate cache settings
    pub fn validate(&self) -> ConfigResult<()> {
        let kind = self.backend_kind()?;

        validate_ttl_seconds("cache.default_ttl_seconds", self.default_ttl_seconds)?;

        if self.memory.max_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache.memory.max_size",
                "0",
                "max_size must be greater than 0",
            ));
        }

        if kind == CacheBackendKind::Redis && self.enabled && self.redis.url.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "cache.redis.url",
                "redis cache backend",
            ));
        }

        if let Some(prefix) = &self.key_prefix {
            if prefix.is_empty() || prefix.contains(['*', '?']) {
                return Err(ConfigurationError::invalid_value(
                    "cache.key_prefix",
                    prefix.clone(),
                    "prefix must be non-empty and contain no glob characters",
                ));
            }
        }

        for (resource, seconds) in &self.ttl_overrides {
            if resource.parse::<crate::cache::ResourceKind>().is_err() {
                return Err(ConfigurationError::invalid_value(
                    "cache.ttl_overrides",
                    resource.clone(),
                    "unknown resource kind",
                ));
            }
            validate_ttl_seconds(&format!("cache.ttl_overrides.{resource}"), *seconds)?;
        }

        Ok(())
    }
}

fn validate_ttl_seconds(field: &str, seconds: u64) -> ConfigResult<()> {
    let max = crate::cache::MAX_TTL.as_secs();
    if seconds == 0 || seconds > max {
        return Err(ConfigurationError::invalid_value(
            field,
            seconds.to_string(),
            format!("TTL must be between 1 and {max} seconds"),
        ));
    }
    Ok(())
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: "memory".to_string(),
            default_ttl_seconds: 300,
            key_prefix: None,
            dedupe_concurrent_misses: true,
            memory: MemoryCacheConfig::default(),
            redis: RedisCacheConfig::default(),
            ttl_overrides: HashMap::new(),
        }
    }
}

/// In-process backend configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MemoryCacheConfig {
    /// Maximum number of live entries
    pub max_size: usize,

    /// Which entry to discard on overflow
    pub eviction: EvictionPolicy,

    /// Interval of the background expiry sweep (0 disables the sweeper)
    pub sweep_interval_seconds: u64,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            eviction: EvictionPolicy::Fifo,
            sweep_interval_seconds: 60,
        }
    }
}

/// Remote backend configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RedisCacheConfig {
    /// Connection URL (`redis://[:password@]host:port[/db]`)
    pub url: String,

    /// Connection establishment timeout in seconds
    pub connection_timeout_seconds: u64,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            connection_timeout_seconds: 5,
        }
    }
}

/// Backoff curve between retry attempts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Fixed,
    Linear,
    #[default]
    Exponential,
}

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first
    pub max_attempts: u32,

    /// Backoff curve
    pub backoff: BackoffKind,

    /// Delay before the first retry
    pub base_delay_ms: u64,

    /// Upper bound on any single delay
    pub max_delay_ms: u64,

    /// Growth factor for exponential backoff
    pub multiplier: f64,

    /// Randomize each delay within [50%, 100%] of its nominal value
    pub jitter: bool,
}

impl RetryConfig {
    /// Validate retry settings
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "retry.max_attempts",
                "0",
                "at least one attempt is required",
            ));
        }

        if self.max_delay_ms < self.base_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "retry.max_delay_ms",
                self.max_delay_ms.to_string(),
                "must be at least base_delay_ms",
            ));
        }

        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "retry.multiplier",
                self.multiplier.to_string(),
                "must be a finite number >= 1.0",
            ));
        }

        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffKind::Exponential,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl GuardConfig {
    /// Validate configuration for consistency and required fields
    pub fn validate(&self) -> ConfigResult<()> {
        self.circuit_breakers.validate()?;
        self.cache.validate()?;
        self.retry.validate()?;
        Ok(())
    }
}
