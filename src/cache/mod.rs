//! # Cache Module
//!
//! Key/value caching in front of slow or rate-limited upstreams.
//!
//! ## Architecture
//!
//! ```text
//! CacheFacade                     <- typed get-or-compute, key prefix, TTL policy, single-flight
//!   └── CacheProvider (enum)      <- zero-cost dispatch, breaker-protected when distributed
//!         ├── Redis(RedisCacheService)    <- SET EX, SCAN MATCH, MGET, atomic pipelines
//!         ├── Memory(MemoryCacheService)  <- bounded, lazy TTL expiry, FIFO or LRU eviction
//!         └── NoOp(NoOpCacheService)      <- always-miss, always-succeed
//! ```
//!
//! ## Design Decisions
//!
//! - **Backend chosen once at startup** from `cache.backend`
//! - **Graceful degradation**: Redis failure falls back to the in-process cache
//! - **Best-effort**: cache errors are logged and degrade to a miss, never propagated
//! - **Namespaced keys**: `"<domain>:<operation>:<params>"`, invalidated by `"<domain>:*"`
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//! use upstream_guard::cache::{CacheFacade, CacheKey, CacheProvider, ResourceKind};
//! use upstream_guard::cache::providers::MemoryCacheService;
//! use upstream_guard::config::EvictionPolicy;
//!
//! # tokio_test::block_on(async {
//! let provider = CacheProvider::memory(MemoryCacheService::new(
//!     1000,
//!     Duration::from_secs(300),
//!     EvictionPolicy::Fifo,
//! ));
//! let cache = CacheFacade::new(provider);
//!
//! let key = CacheKey::build("products", "list", &serde_json::json!({"page": 1})).unwrap();
//! let page: Result<Vec<String>, String> = cache
//!     .get_or_compute_for(ResourceKind::ProductListing, &key, || async {
//!         Ok(vec!["lamp".to_string()])
//!     })
//!     .await;
//! assert_eq!(page.unwrap(), vec!["lamp".to_string()]);
//!
//! assert_eq!(cache.invalidate_domain("products").await, 1);
//! # });
//! ```

pub mod errors;
pub mod facade;
pub mod keys;
pub mod pattern;
pub mod provider;
pub mod providers;
pub mod traits;
pub mod ttl_policy;

pub use errors::{CacheError, CacheResult};
pub use facade::CacheFacade;
pub use keys::CacheKey;
pub use pattern::GlobPattern;
pub use provider::CacheProvider;
pub use providers::{MemoryCacheService, NoOpCacheService};
pub use traits::{CacheStore, MAX_TTL};
pub use ttl_policy::{ResourceKind, TtlPolicy};

#[cfg(feature = "cache-redis")]
pub use providers::RedisCacheService;
