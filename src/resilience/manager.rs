//! # Circuit Breaker Registry
//!
//! Creates and retrieves circuit breakers by logical component name, aggregates
//! their status, and exposes the administrative surface (force, reset).
//!
//! The registry is built once at startup and shared by reference. Its
//! name → breaker map is the only shared mutable state across breakers;
//! concurrent first use of a name resolves to a single instance.

use crate::config::CircuitBreakerConfig as CircuitBreakerSettings;
use crate::resilience::events::{self, StateTransition, TransitionSender};
use crate::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStatus, CircuitState,
    SystemCircuitBreakerStatus,
};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Registry of circuit breakers across system components
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    /// Circuit breakers by component name
    circuit_breakers: DashMap<String, Arc<CircuitBreaker>>,

    /// Configuration used by `get_circuit_breaker`
    settings: CircuitBreakerSettings,

    /// Transition channel shared by every breaker in the registry
    events: TransitionSender,
}

impl CircuitBreakerRegistry {
    /// Create a registry from configuration
    pub fn from_config(settings: &CircuitBreakerSettings) -> Self {
        info!(
            configured_components = settings.component_configs.len(),
            max_circuit_breakers = settings.global_settings.max_circuit_breakers,
            "Initializing circuit breaker registry"
        );
        if !settings.enabled {
            info!("Circuit breakers disabled, failures will not open any circuit");
        }

        Self {
            circuit_breakers: DashMap::new(),
            settings: settings.clone(),
            events: events::channel(),
        }
    }

    /// Get the breaker for `name`, creating it with `config` on first use.
    ///
    /// Idempotent per name: the first caller's configuration wins and later
    /// calls with a different configuration are ignored (logged at debug).
    /// A disabled registry creates breakers that never open on failures.
    pub fn get_or_create(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.circuit_breakers.get(name) {
            if existing.config() != &config {
                debug!(
                    component = name,
                    "Circuit breaker already registered, ignoring new configuration"
                );
            }
            return Arc::clone(existing.value());
        }

        let breaker = self
            .circuit_breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                let breaker = CircuitBreaker::with_event_sender(name, config, self.events.clone());
                if self.settings.enabled {
                    Arc::new(breaker)
                } else {
                    Arc::new(breaker.without_tripping())
                }
            })
            .value()
            .clone();

        let total = self.circuit_breakers.len();
        if total > self.settings.global_settings.max_circuit_breakers {
            warn!(
                component = name,
                current_count = total,
                max_allowed = self.settings.global_settings.max_circuit_breakers,
                "Circuit breaker count exceeds configured maximum"
            );
        }

        breaker
    }

    /// Get or create a breaker using the configured settings for `name`.
    ///
    /// Lookup order: explicit component entry, built-in preset, default entry.
    pub fn get_circuit_breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.circuit_breakers.get(name) {
            return Arc::clone(existing.value());
        }
        self.get_or_create(name, self.config_for(name))
    }

    /// Resolve the runtime configuration a new breaker named `name` would get
    pub fn config_for(&self, name: &str) -> CircuitBreakerConfig {
        if let Some(component) = self.settings.component_configs.get(name) {
            return component.to_resilience_config();
        }
        CircuitBreakerConfig::preset_for(name)
            .unwrap_or_else(|| self.settings.default_config.to_resilience_config())
    }

    /// Look up an existing breaker without creating one
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.circuit_breakers
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Whether failures may open breakers created by this registry
    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Get all circuit breaker names, sorted
    pub fn list_components(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .circuit_breakers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort_unstable();
        names
    }

    /// Number of registered breakers
    pub fn len(&self) -> usize {
        self.circuit_breakers.len()
    }

    /// True when no breaker has been created yet
    pub fn is_empty(&self) -> bool {
        self.circuit_breakers.is_empty()
    }

    /// Subscribe to transitions of every breaker in the registry
    pub fn subscribe(&self) -> broadcast::Receiver<StateTransition> {
        self.events.subscribe()
    }

    /// Status snapshot of one breaker
    pub fn get_status(&self, name: &str) -> Option<CircuitBreakerStatus> {
        self.get(name).map(|breaker| breaker.get_status())
    }

    /// Name → status mapping for every registered breaker
    pub fn get_all_status(&self) -> HashMap<String, CircuitBreakerStatus> {
        self.breakers()
            .into_iter()
            .map(|breaker| (breaker.name().to_string(), breaker.get_status()))
            .collect()
    }

    /// Registry-wide aggregation (health score, counts by state)
    pub fn system_status(&self) -> SystemCircuitBreakerStatus {
        SystemCircuitBreakerStatus::new(self.get_all_status())
    }

    /// Force a named breaker into `state`; false when the name is unknown
    pub fn force_state(&self, name: &str, state: CircuitState) -> bool {
        match self.get(name) {
            Some(breaker) => {
                breaker.force_state(state);
                true
            }
            None => {
                warn!(component = name, "Cannot force state of unknown circuit breaker");
                false
            }
        }
    }

    /// Force CLOSED and zero counters of one breaker; false when unknown
    pub fn reset(&self, name: &str) -> bool {
        match self.get(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Force every breaker CLOSED and clear its statistics
    pub fn reset_all(&self) {
        let breakers = self.breakers();
        warn!(count = breakers.len(), "Resetting all circuit breakers");
        for breaker in breakers {
            breaker.reset();
        }
    }

    /// Clone out the breakers so no map shard lock is held while calling them
    fn breakers(&self) -> Vec<Arc<CircuitBreaker>> {
        self.circuit_breakers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::from_config(&CircuitBreakerSettings::default())
    }
}
