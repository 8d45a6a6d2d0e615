//! In-process cache provider
//!
//! Bounded key/value store with per-entry TTL for single-instance deployments.
//!
//! - **Eviction**: on overflow expired entries are purged first; only when
//!   none are expired is the entry at the front of the order discarded. With [`EvictionPolicy::Fifo`] the order is insertion order and
//!   reads never reorder; overwriting a key keeps its position. With
//!   [`EvictionPolicy::Lru`] every read or write moves the key to the back.
//! - **Expiry**: checked lazily. An expired entry is invisible to every read
//!   and is removed when a read touches it; [`MemoryCacheService::spawn_sweeper`]
//!   purges the rest in the background. A TTL longer than [`MAX_TTL`] is
//!   stored without expiry.
//!
//! **Important**: This cache is NOT distributed. Each process maintains its own
//! cache state.

use crate::cache::errors::CacheResult;
use crate::cache::pattern::GlobPattern;
use crate::cache::traits::{CacheStore, MAX_TTL};
use crate::config::{EvictionPolicy, MemoryCacheConfig};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    /// `None` never expires
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: &str, ttl: Duration) -> Self {
        let expires_at = if ttl > MAX_TTL {
            None
        } else {
            Instant::now().checked_add(ttl)
        };
        Self {
            value: value.to_string(),
            expires_at,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if now >= at)
    }
}

type EntryMap = IndexMap<String, Entry>;

/// In-memory cache service
#[derive(Clone)]
pub struct MemoryCacheService {
    entries: Arc<Mutex<EntryMap>>,
    max_size: usize,
    default_ttl: Duration,
    eviction: EvictionPolicy,
}

impl std::fmt::Debug for MemoryCacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCacheService")
            .field("max_size", &self.max_size)
            .field("entry_count", &self.len())
            .field("default_ttl", &self.default_ttl)
            .field("eviction", &self.eviction)
            .finish()
    }
}

impl MemoryCacheService {
    /// Create a new in-memory cache service from configuration
    pub fn from_config(config: &MemoryCacheConfig, default_ttl: Duration) -> Self {
        debug!(
            max_size = config.max_size,
            eviction = ?config.eviction,
            ttl_seconds = default_ttl.as_secs(),
            "In-memory cache service created"
        );

        Self {
            entries: Arc::new(Mutex::new(IndexMap::with_capacity(config.max_size.min(4096)))),
            max_size: config.max_size.max(1),
            default_ttl,
            eviction: config.eviction,
        }
    }

    /// Create with explicit settings (for testing)
    pub fn new(max_size: usize, default_ttl: Duration, eviction: EvictionPolicy) -> Self {
        Self::from_config(
            &MemoryCacheConfig {
                max_size,
                eviction,
                sweep_interval_seconds: 0,
            },
            default_ttl,
        )
    }

    /// Physically stored entries, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        let dropped = entries.len();
        entries.clear();
        debug!(dropped = dropped, "In-memory cache cleared");
    }

    /// Remove every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        Self::purge_map(&self.entries)
    }

    fn purge_map(entries: &Mutex<EntryMap>) -> usize {
        let now = Instant::now();
        let mut entries = entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Spawn a background task purging expired entries every `interval`.
    ///
    /// The task holds only a weak reference and exits once the cache is dropped.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let entries: Weak<Mutex<EntryMap>> = Arc::downgrade(&self.entries);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(entries) = entries.upgrade() else {
                    debug!("Cache dropped, sweeper exiting");
                    break;
                };
                let purged = Self::purge_map(&entries);
                if purged > 0 {
                    debug!(purged = purged, "Swept expired cache entries");
                }
            }
        })
    }

    fn read_locked(&self, entries: &mut EntryMap, key: &str, now: Instant) -> Option<String> {
        let index = entries.get_index_of(key)?;
        let expired = entries
            .get_index(index)
            .map(|(_, entry)| entry.is_expired(now))
            .unwrap_or(true);

        if expired {
            entries.shift_remove_index(index);
            debug!(key = key, "Cache EXPIRED (memory)");
            return None;
        }

        let last = entries.len() - 1;
        if self.eviction == EvictionPolicy::Lru && index != last {
            entries.move_index(index, last);
            return entries.get_index(last).map(|(_, entry)| entry.value.clone());
        }
        entries.get_index(index).map(|(_, entry)| entry.value.clone())
    }

    fn write_locked(&self, entries: &mut EntryMap, key: &str, value: &str, ttl: Duration) {
        let entry = Entry::new(value, ttl);

        if let Some(index) = entries.get_index_of(key) {
            if let Some((_, slot)) = entries.get_index_mut(index) {
                *slot = entry;
            }
            if self.eviction == EvictionPolicy::Lru {
                let last = entries.len() - 1;
                entries.move_index(index, last);
            }
            return;
        }

        if entries.len() >= self.max_size {
            let now = Instant::now();
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired(now));
            if entries.len() < before {
                debug!(purged = before - entries.len(), "Purged expired entries before eviction");
            }
        }
        while entries.len() >= self.max_size {
            if let Some((evicted, _)) = entries.shift_remove_index(0) {
                debug!(key = %evicted, policy = ?self.eviction, "Cache EVICT (memory)");
            }
        }
        entries.insert(key.to_string(), entry);
    }
}

impl CacheStore for MemoryCacheService {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let now = Instant::now();
        let result = {
            let mut entries = self.entries.lock();
            self.read_locked(&mut entries, key, now)
        };

        if result.is_some() {
            debug!(key = key, "Cache HIT (memory)");
        } else {
            debug!(key = key, "Cache MISS (memory)");
        }

        Ok(result)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        {
            let mut entries = self.entries.lock();
            self.write_locked(&mut entries, key, value, ttl);
        }
        debug!(key = key, ttl_seconds = ttl.as_secs(), "Cache SET (memory)");
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.lock().shift_remove(key);
        debug!(key = key, "Cache DEL (memory)");
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let glob = GlobPattern::new(pattern)?;
        let now = Instant::now();
        let entries = self.entries.lock();
        Ok(entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired(now) && glob.matches(key))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn delete_pattern(&self, pattern: &str) -> CacheResult<u64> {
        let glob = GlobPattern::new(pattern)?;
        let now = Instant::now();
        let mut deleted: u64 = 0;
        {
            let mut entries = self.entries.lock();
            entries.retain(|key, entry| {
                if !glob.matches(key) {
                    return true;
                }
                if !entry.is_expired(now) {
                    deleted += 1;
                }
                false
            });
        }
        debug!(pattern = pattern, deleted = deleted, "Cache pattern DEL (memory)");
        Ok(deleted)
    }

    async fn batch_get(&self, keys: &[String]) -> CacheResult<Vec<Option<String>>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        Ok(keys
            .iter()
            .map(|key| self.read_locked(&mut entries, key, now))
            .collect())
    }

    async fn batch_set(&self, items: &[(String, String)], ttl: Option<Duration>) -> CacheResult<()> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        {
            let mut entries = self.entries.lock();
            for (key, value) in items {
                self.write_locked(&mut entries, key, value, ttl);
            }
        }
        debug!(count = items.len(), "Cache batch SET (memory)");
        Ok(())
    }

    async fn health_check(&self) -> CacheResult<bool> {
        // In-memory cache is always healthy
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }

    fn is_distributed(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    fn fifo(max_size: usize) -> MemoryCacheService {
        MemoryCacheService::new(max_size, Duration::from_secs(60), EvictionPolicy::Fifo)
    }

    #[tokio::test]
    async fn test_memory_set_get_delete() {
        let svc = fifo(10);
        assert_eq!(svc.get("missing").await.unwrap(), None);

        let value = r#"{"name":"Trail Runner","price":129.0}"#;
        svc.set("products:detail:1", value, None).await.unwrap();
        assert_eq!(
            svc.get("products:detail:1").await.unwrap().as_deref(),
            Some(value)
        );

        svc.delete("products:detail:1").await.unwrap();
        assert_eq!(svc.get("products:detail:1").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_lazily() {
        let svc = fifo(10);
        svc.set("k", "v", Some(Duration::from_secs(1))).await.unwrap();
        assert!(svc.get("k").await.unwrap().is_some());

        advance(Duration::from_secs(2)).await;

        // Still stored, but invisible and removed by the read
        assert_eq!(svc.len(), 1);
        assert_eq!(svc.get("k").await.unwrap(), None);
        assert_eq!(svc.len(), 0);
    }

    #[tokio::test]
    async fn test_fifo_evicts_earliest_inserted_even_if_recently_read() {
        let svc = fifo(3);
        for key in ["a", "b", "c"] {
            svc.set(key, key, None).await.unwrap();
        }
        // Reading does not protect "a" under FIFO
        assert!(svc.get("a").await.unwrap().is_some());
        // Overwriting keeps the original position
        svc.set("a", "a2", None).await.unwrap();

        svc.set("d", "d", None).await.unwrap();

        assert_eq!(svc.get("a").await.unwrap(), None);
        assert!(svc.get("b").await.unwrap().is_some());
        assert_eq!(svc.len(), 3);
    }

    #[tokio::test]
    async fn test_lru_keeps_recently_read_key() {
        let svc = MemoryCacheService::new(3, Duration::from_secs(60), EvictionPolicy::Lru);
        for key in ["a", "b", "c"] {
            svc.set(key, key, None).await.unwrap();
        }
        assert!(svc.get("a").await.unwrap().is_some());

        svc.set("d", "d", None).await.unwrap();

        assert_eq!(svc.get("a").await.unwrap().as_deref(), Some("a"));
        assert_eq!(svc.get("b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_keys_and_delete_pattern() {
        let svc = fifo(10);
        svc.set("products:list:1", "1", None).await.unwrap();
        svc.set("products:detail:9", "9", None).await.unwrap();
        svc.set("categories:tree", "t", None).await.unwrap();

        let mut keys = svc.keys("products:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["products:detail:9", "products:list:1"]);

        assert_eq!(svc.delete_pattern("products:*").await.unwrap(), 2);
        assert!(svc.keys("products:*").await.unwrap().is_empty());
        assert!(svc.get("categories:tree").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_batch_operations() {
        let svc = fifo(10);
        svc.batch_set(
            &[
                ("x".to_string(), "1".to_string()),
                ("y".to_string(), "2".to_string()),
            ],
            None,
        )
        .await
        .unwrap();

        let values = svc
            .batch_get(&["x".to_string(), "nope".to_string(), "y".to_string()])
            .await
            .unwrap();
        assert_eq!(values, vec![Some("1".to_string()), None, Some("2".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_and_sweeper() {
        let svc = fifo(10);
        svc.set("short", "s", Some(Duration::from_secs(1))).await.unwrap();
        svc.set("long", "l", Some(Duration::from_secs(600))).await.unwrap();

        advance(Duration::from_secs(2)).await;
        assert_eq!(svc.purge_expired(), 1);
        assert_eq!(svc.len(), 1);

        svc.set("short", "s", Some(Duration::from_secs(1))).await.unwrap();
        let sweeper = svc.spawn_sweeper(Duration::from_secs(5));
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(svc.len(), 1);

        drop(svc);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(sweeper.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_beyond_max_never_expires() {
        let svc = fifo(10);
        svc.set("forever", "v", Some(Duration::MAX)).await.unwrap();
        svc.batch_set(&[("also".to_string(), "w".to_string())], Some(MAX_TTL * 2))
            .await
            .unwrap();

        advance(Duration::from_secs(365 * 24 * 60 * 60)).await;
        assert_eq!(svc.get("forever").await.unwrap().as_deref(), Some("v"));
        assert_eq!(svc.get("also").await.unwrap().as_deref(), Some("w"));
        assert_eq!(svc.purge_expired(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_free_capacity_before_eviction() {
        let svc = fifo(3);
        svc.set("oldest", "a", None).await.unwrap();
        svc.set("stale", "b", Some(Duration::from_secs(1))).await.unwrap();
        svc.set("newer", "c", None).await.unwrap();

        advance(Duration::from_secs(2)).await;
        svc.set("incoming", "d", None).await.unwrap();

        assert_eq!(svc.len(), 3);
        assert_eq!(svc.get("oldest").await.unwrap().as_deref(), Some("a"));
        assert_eq!(svc.keys("*").await.unwrap(), vec!["oldest", "newer", "incoming"]);
    }

    #[tokio::test]
    async fn test_memory_provider_metadata() {
        let svc = fifo(1);
        assert_eq!(svc.provider_name(), "memory");
        assert!(!svc.is_distributed());
        assert!(svc.health_check().await.unwrap());
    }
}
