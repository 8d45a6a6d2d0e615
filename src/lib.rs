#![allow(clippy::doc_markdown)] // Allow technical terms like HALF_OPEN, Redis in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Upstream Guard
//!
//! Fault tolerance for the calls an application makes to flaky, slow or
//! rate-limited external dependencies: AI content generation, media hosting,
//! transactional email and messaging delivery.
//!
//! ## Overview
//!
//! Two engines work together:
//!
//! - **Circuit breakers**: one per dependency, wrapping each call in a timeout,
//!   failing fast while the dependency is down and probing for recovery
//! - **Hybrid cache**: an in-process or Redis backend behind one interface,
//!   with namespaced keys, per-resource TTLs and get-or-compute
//!
//! Retries with backoff compose with both for idempotent sends.
//!
//! ## Module Organization
//!
//! - [`resilience`] - Circuit breakers, registry, retry executor, transition events
//! - [`cache`] - Cache backends, provider selection, typed facade
//! - [`notify`] - Protected notification and upstream client call sites
//! - [`config`] - Layered TOML + environment configuration
//! - [`system`] - Startup wiring and shutdown
//! - [`logging`] - Structured `tracing` setup
//! - [`error`] - Crate error type
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use upstream_guard::cache::{CacheKey, ResourceKind};
//! use upstream_guard::resilience::components;
//! use upstream_guard::ResilienceSystem;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! upstream_guard::logging::init_structured_logging();
//! let system = ResilienceSystem::new().await?;
//!
//! // Cached, breaker-protected AI call
//! let ai = system.client(components::AI_SERVICE);
//! let key = CacheKey::build("ai", "describe", &serde_json::json!({"product": 7}))?;
//! let text: String = ai
//!     .call_cached(system.cache(), ResourceKind::AiContent, &key, || async {
//!         Ok::<_, std::io::Error>("A warm brass lamp".to_string())
//!     })
//!     .await?;
//!
//! println!("{text}; breakers: {}", system.registry().system_status().format_summary());
//! system.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod notify;
pub mod resilience;
pub mod system;

pub use cache::{CacheError, CacheFacade, CacheKey, CacheProvider, ResourceKind};
pub use config::{ConfigManager, ConfigurationError, GuardConfig};
pub use error::{GuardError, Result};
pub use notify::{DeliveryOutcome, Notification, ProtectedClient, ProtectedNotifier};
pub use resilience::{
    CircuitBreaker, CircuitBreakerError, CircuitBreakerRegistry, CircuitState, RetryError,
    RetryExecutor, RetryPolicy,
};
pub use system::{ResilienceSystem, SystemHealth};
