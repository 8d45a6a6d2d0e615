//! Integration tests for cache backends and the typed facade

mod common;

use common::{init_test_logging, CallCounter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use upstream_guard::cache::{
    CacheFacade, CacheKey, CacheProvider, CacheStore, MemoryCacheService, ResourceKind, TtlPolicy,
};
use upstream_guard::config::{CacheConfig, EvictionPolicy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ProductPage {
    page: u32,
    ids: Vec<u32>,
}

fn memory(max_size: usize, eviction: EvictionPolicy) -> MemoryCacheService {
    MemoryCacheService::new(max_size, Duration::from_secs(300), eviction)
}

#[tokio::test]
async fn test_memory_round_trip_and_overwrite() -> Result<(), Box<dyn std::error::Error>> {
    init_test_logging();
    let cache = memory(100, EvictionPolicy::Fifo);

    cache.set("settings:site", "v1", None).await?;
    assert_eq!(cache.get("settings:site").await?, Some("v1".to_string()));

    cache.set("settings:site", "v2", None).await?;
    assert_eq!(cache.get("settings:site").await?, Some("v2".to_string()));
    assert_eq!(cache.len(), 1);

    cache.delete("settings:site").await?;
    cache.delete("settings:site").await?;
    assert_eq!(cache.get("settings:site").await?, None);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_entries_expire_in_simulated_time() -> Result<(), Box<dyn std::error::Error>> {
    let cache = memory(100, EvictionPolicy::Fifo);
    cache
        .set("dashboard:stats", "{\"orders\":12}", Some(Duration::from_secs(1)))
        .await?;

    tokio::time::advance(Duration::from_millis(999)).await;
    assert!(cache.get("dashboard:stats").await?.is_some());

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(cache.get("dashboard:stats").await?, None);
    assert!(cache.keys("dashboard:*").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_fifo_evicts_oldest_insert() -> Result<(), Box<dyn std::error::Error>> {
    let cache = memory(3, EvictionPolicy::Fifo);
    for key in ["k1", "k2", "k3"] {
        cache.set(key, key, None).await?;
    }
    // Reads never reorder under FIFO
    assert!(cache.get("k1").await?.is_some());

    cache.set("k4", "k4", None).await?;
    assert_eq!(cache.len(), 3);
    assert_eq!(cache.get("k1").await?, None);
    assert_eq!(cache.keys("k*").await?, vec!["k2", "k3", "k4"]);
    Ok(())
}

#[tokio::test]
async fn test_lru_keeps_recently_read_key() -> Result<(), Box<dyn std::error::Error>> {
    let cache = memory(3, EvictionPolicy::Lru);
    for key in ["k1", "k2", "k3"] {
        cache.set(key, key, None).await?;
    }
    assert!(cache.get("k1").await?.is_some());

    cache.set("k4", "k4", None).await?;
    assert_eq!(cache.get("k1").await?, Some("k1".to_string()));
    assert_eq!(cache.get("k2").await?, None);
    Ok(())
}

#[tokio::test]
async fn test_delete_pattern_scoped_to_domain() -> Result<(), Box<dyn std::error::Error>> {
    let cache = memory(100, EvictionPolicy::Fifo);
    cache
        .batch_set(
            &[
                ("products:list:1".to_string(), "a".to_string()),
                ("products:detail:7".to_string(), "b".to_string()),
                ("categories:tree".to_string(), "c".to_string()),
                ("orders:recent".to_string(), "d".to_string()),
            ],
            None,
        )
        .await?;

    assert_eq!(cache.delete_pattern("products:*").await?, 2);
    assert_eq!(cache.delete_pattern("products:*").await?, 0);

    let remaining = cache
        .batch_get(&[
            "products:list:1".to_string(),
            "categories:tree".to_string(),
            "orders:recent".to_string(),
        ])
        .await?;
    assert_eq!(remaining, vec![None, Some("c".to_string()), Some("d".to_string())]);
    Ok(())
}

#[tokio::test]
async fn test_disabled_cache_always_computes() -> Result<(), Box<dyn std::error::Error>> {
    let config = CacheConfig {
        enabled: false,
        ..CacheConfig::default()
    };
    let provider = CacheProvider::from_config_graceful(&config, None).await;
    assert!(!provider.is_enabled());

    let facade = CacheFacade::from_config(provider, &config);
    let calls = CallCounter::default();
    for _ in 0..3 {
        let value: u32 = facade
            .get_or_compute("orders:count", Duration::from_secs(30), || async {
                Ok::<_, std::io::Error>(calls.hit())
            })
            .await?;
        assert!(value >= 1);
    }
    assert_eq!(calls.count(), 3);
    Ok(())
}

#[tokio::test]
async fn test_facade_caches_typed_values_per_resource() -> Result<(), Box<dyn std::error::Error>> {
    let service = memory(100, EvictionPolicy::Fifo);
    let facade = CacheFacade::new(CacheProvider::memory(service.clone()))
        .with_key_prefix("shop")
        .with_ttl_policy(
            TtlPolicy::new().with_override(ResourceKind::ProductListing, Duration::from_secs(5)),
        );

    let key = CacheKey::build("products", "list", &serde_json::json!({"page": 2}))?;
    let calls = CallCounter::default();
    let load = || async {
        calls.hit();
        Ok::<_, std::io::Error>(ProductPage {
            page: 2,
            ids: vec![11, 12, 13],
        })
    };

    let first = facade
        .get_or_compute_for(ResourceKind::ProductListing, &key, load)
        .await?;
    let second = facade
        .get_or_compute_for(ResourceKind::ProductListing, &key, load)
        .await?;
    assert_eq!(first, second);
    assert_eq!(calls.count(), 1);

    // Stored under the prefixed key
    let stored = service.keys("shop:products:*").await?;
    assert_eq!(stored, vec![format!("shop:{key}")]);

    assert_eq!(facade.invalidate_domain("products").await, 1);
    assert!(facade.get::<ProductPage>(&key).await.is_none());
    Ok(())
}

#[tokio::test]
async fn test_concurrent_misses_compute_once() -> Result<(), Box<dyn std::error::Error>> {
    let facade = Arc::new(CacheFacade::new(CacheProvider::memory(memory(
        100,
        EvictionPolicy::Fifo,
    ))));
    let calls = CallCounter::default();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let facade = Arc::clone(&facade);
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            facade
                .get_or_compute("ai:describe:7", Duration::from_secs(60), || async {
                    calls.hit();
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, std::io::Error>("A warm brass lamp".to_string())
                })
                .await
        }));
    }

    for handle in handles {
        assert_eq!(handle.await??, "A warm brass lamp");
    }
    assert_eq!(calls.count(), 1);
    Ok(())
}
