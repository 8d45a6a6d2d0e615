//! Circuit breaker protected upstream client for request/response APIs
//! (AI content generation, media hosting).
//!
//! These calls are not retried: they are expensive and a caller is usually
//! waiting. An open circuit is answered from a fallback instead, typically a
//! cached or templated response.

use crate::cache::{CacheFacade, CacheKey, ResourceKind};
use crate::resilience::{
    CircuitBreaker, CircuitBreakerError, CircuitBreakerRegistry, CircuitOpenInfo, CircuitState,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Upstream client with circuit breaker protection
#[derive(Debug, Clone)]
pub struct ProtectedClient {
    circuit_breaker: Arc<CircuitBreaker>,
}

impl ProtectedClient {
    pub fn new(circuit_breaker: Arc<CircuitBreaker>) -> Self {
        Self { circuit_breaker }
    }

    /// Client for a registry component (`ai-service`, `media-service`, ...)
    pub fn from_registry(registry: &CircuitBreakerRegistry, component: &str) -> Self {
        Self::new(registry.get_circuit_breaker(component))
    }

    pub fn component(&self) -> &str {
        self.circuit_breaker.name()
    }

    pub fn state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }

    pub fn is_healthy(&self) -> bool {
        self.circuit_breaker.is_healthy()
    }

    /// Call the upstream with circuit breaker protection
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.circuit_breaker.execute(operation).await
    }

    /// Call the upstream, answering from `fallback` while the circuit is open
    pub async fn call_with_fallback<F, Fut, T, E, FB>(
        &self,
        operation: F,
        fallback: FB,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
        FB: FnOnce(&CircuitOpenInfo) -> T,
    {
        self.circuit_breaker
            .execute_with_fallback(operation, fallback)
            .await
    }

    /// Serve from `cache` when possible, otherwise call the upstream and cache
    /// the response with the TTL of `kind`. Rejections and failures are not cached.
    pub async fn call_cached<F, Fut, T, E>(
        &self,
        cache: &CacheFacade,
        kind: ResourceKind,
        key: &CacheKey,
        operation: F,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        cache
            .get_or_compute_for(kind, key, || self.circuit_breaker.execute(operation))
            .await
    }
}
