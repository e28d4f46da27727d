//! Integration tests for keystone-cache

use keystone_cache::*;
use std::sync::Arc;
use std::time::Duration;

fn config() -> CacheConfig {
    CacheConfig::new("redis")
        .with_prefix("shop")
        .with_store("redis", StoreConfig::redis("cache"))
        .with_store("memory", StoreConfig::memory())
        .with_store(
            "database",
            StoreConfig::database("cache").with_option("gc_probability", 0),
        )
}

struct Fixture {
    manager: CacheManager,
    kv: Arc<MemoryKvConnections>,
    tables: Arc<MemoryTables>,
    clock: ManualClock,
}

fn fixture() -> Fixture {
    let clock = ManualClock::new();
    let kv = Arc::new(MemoryKvConnections::new().with_clock(Arc::new(clock.clone())));
    let tables = Arc::new(MemoryTables::new());
    let manager = CacheManager::builder(config())
        .with_kv(kv.clone())
        .with_tables(tables.clone())
        .with_clock(Arc::new(clock.clone()))
        .build();

    Fixture {
        manager,
        kv,
        tables,
        clock,
    }
}

#[tokio::test]
async fn test_default_store_round_trip() {
    let fx = fixture();
    let cache = fx.manager.default_store().await.unwrap();

    cache
        .put("product:1", &serde_json::json!({"sku": "A-1", "stock": 4}), 5)
        .await
        .unwrap();

    let product: serde_json::Value = cache.get("product:1").await.unwrap().unwrap();
    assert_eq!(product["sku"], "A-1");
    assert!(fx.kv.server("cache").contains("shop:product:1"));

    fx.clock.advance(Duration::from_secs(5 * 60));
    assert!(cache.get::<serde_json::Value>("product:1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_tag_flush_removes_tagged_entries() {
    let fx = fixture();
    let cache = fx.manager.default_store().await.unwrap();

    let products = cache.tags(["products"]).unwrap();
    let featured = cache.tags(["products", "featured"]).unwrap();

    products.put("list", &vec![1, 2, 3], 10).await.unwrap();
    featured.forever("hero", "product:1").await.unwrap();
    cache.put("untagged", &true, 10).await.unwrap();

    assert_eq!(products.get::<Vec<i32>>("list").await.unwrap(), Some(vec![1, 2, 3]));
    assert_eq!(
        featured.get::<String>("hero").await.unwrap().as_deref(),
        Some("product:1")
    );
    assert!(!featured.has("list").await.unwrap());

    cache.tags(["products"]).unwrap().flush().await.unwrap();

    assert!(!cache.tags(["products"]).unwrap().has("list").await.unwrap());
    assert!(!cache.tags(["products", "featured"]).unwrap().has("hero").await.unwrap());
    assert!(cache.has("untagged").await.unwrap());
}

#[tokio::test]
async fn test_tagged_remember_computes_once_per_version() {
    let fx = fixture();
    let cache = fx.manager.default_store().await.unwrap();
    let tagged = cache.tags(["reports"]).unwrap();

    let first: i64 = tagged.remember("total", 10, || async { Ok(1) }).await.unwrap();
    let second: i64 = tagged.remember("total", 10, || async { Ok(2) }).await.unwrap();
    assert_eq!((first, second), (1, 1));

    tagged.flush().await.unwrap();
    let third: i64 = tagged.remember("total", 10, || async { Ok(3) }).await.unwrap();
    assert_eq!(third, 3);
}

#[tokio::test]
async fn test_database_store_through_manager() {
    let fx = fixture();
    let cache = fx.manager.store(Some("database")).await.unwrap();
    let table = fx.tables.get(None, "cache");

    cache.put("visits", &0, 10).await.unwrap();
    assert_eq!(cache.increment("visits", 3).await.unwrap(), Some(3));
    assert_eq!(cache.decrement("visits", 1).await.unwrap(), Some(2));
    assert_eq!(cache.increment("absent", 1).await.unwrap(), None);

    let rows = table.rows().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].key, "shopvisits");

    // Untracked tagging leaves rows behind after a tag flush.
    let tagged = cache.tags(["stats"]).unwrap();
    tagged.put("daily", &7, 10).await.unwrap();
    tagged.flush().await.unwrap();
    assert!(!cache.tags(["stats"]).unwrap().has("daily").await.unwrap());
    assert!(table.len().await >= 3);

    cache.flush().await.unwrap();
    assert!(table.is_empty().await);
}

#[tokio::test]
async fn test_stores_are_isolated() {
    let fx = fixture();
    let redis = fx.manager.store(Some("redis")).await.unwrap();
    let memory = fx.manager.store(Some("memory")).await.unwrap();

    redis.put("k", "redis", 10).await.unwrap();
    memory.put("k", "memory", 10).await.unwrap();

    assert_eq!(redis.get::<String>("k").await.unwrap().as_deref(), Some("redis"));
    assert_eq!(memory.get::<String>("k").await.unwrap().as_deref(), Some("memory"));

    memory.flush().await.unwrap();
    assert!(redis.has("k").await.unwrap());
    assert!(!memory.has("k").await.unwrap());
}

#[tokio::test]
async fn test_add_only_writes_missing_keys() {
    let fx = fixture();
    let cache = fx.manager.default_store().await.unwrap();

    assert!(cache.add("lock", "first", 1).await.unwrap());
    assert!(!cache.add("lock", "second", 1).await.unwrap());
    assert_eq!(cache.get::<String>("lock").await.unwrap().as_deref(), Some("first"));

    fx.clock.advance(Duration::from_secs(61));
    assert!(cache.add("lock", "third", 1).await.unwrap());
}

#[cfg(feature = "redis")]
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_live_redis_tag_flush() {
    let connections = keystone_redis::RedisConnections::from_env("local");
    let manager = CacheManager::builder(CacheConfig::new("redis").with_store(
        "redis",
        StoreConfig::redis("local").with_prefix("keystone_it"),
    ))
    .with_kv(Arc::new(connections))
    .build();

    let cache = manager.default_store().await.unwrap();
    let tagged = cache.tags(["it"]).unwrap();
    tagged.put("k", &1, 1).await.unwrap();
    assert!(tagged.has("k").await.unwrap());

    tagged.flush().await.unwrap();
    assert!(!cache.tags(["it"]).unwrap().has("k").await.unwrap());
}
