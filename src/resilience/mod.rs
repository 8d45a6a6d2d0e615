//! # Resilience Module
//!
//! Fault isolation for calls to flaky, slow or rate-limited external
//! dependencies (AI content generation, media hosting, email, messaging).
//!
//! ## Architecture
//!
//! - **Circuit Breakers**: one per logical dependency, failing fast while the
//!   dependency is down and probing for recovery after a reset timeout
//! - **Registry**: creates breakers lazily by name and exposes status and
//!   administrative overrides
//! - **Retries**: bounded, attempt-indexed backoff for idempotent operations,
//!   composed with a breaker so an open circuit stops the retry loop
//! - **Events**: state transitions published on a broadcast channel
//!
//! ## Usage
//!
//! ```rust,no_run
//! use upstream_guard::resilience::{components, CircuitBreakerRegistry};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = CircuitBreakerRegistry::default();
//! let email = registry.get_circuit_breaker(components::EMAIL_SERVICE);
//!
//! let receipt = email
//!     .execute(|| async { Ok::<_, std::io::Error>("queued") })
//!     .await?;
//! # let _ = receipt;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod events;
pub mod manager;
pub mod metrics;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitOpenInfo, CircuitState};
pub use config::{components, CircuitBreakerConfig};
pub use events::{StateTransition, TransitionReason};
pub use manager::CircuitBreakerRegistry;
pub use metrics::{CircuitBreakerStats, CircuitBreakerStatus, SystemCircuitBreakerStatus};
pub use retry::{with_retry, Backoff, RetryError, RetryExecutor, RetryPolicy};
