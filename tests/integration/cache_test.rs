//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 缓存装饰器集成测试

#[path = "../common/mod.rs"]
mod common;

use common::{setup_logging, CountingProvider};
use oxdata::config::CacheConfig;
use oxdata::error::DataError;
use oxdata::mapper::json::JsonMapper;
use oxdata::provider::{AsyncDataProvider, DataProvider, MemoryProvider};
use oxdata::{CachedDataProvider, MappedProvider};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[tokio::test]
async fn test_put_get_remove_size_over_memory() {
    setup_logging();

    let cache = CachedDataProvider::new(MemoryProvider::<String>::with_name("scenario"));

    DataProvider::put(&cache, "x", "1".to_string()).unwrap();
    assert_eq!(
        AsyncDataProvider::get(&cache, "x").await.unwrap().as_deref(),
        Some("1")
    );

    AsyncDataProvider::remove(&cache, "x").await.unwrap();
    assert_eq!(AsyncDataProvider::get(&cache, "x").await.unwrap(), None);
    assert_eq!(AsyncDataProvider::size(&cache).await.unwrap(), 0);
}

#[tokio::test]
async fn test_async_contract_through_cache() {
    let cache = CachedDataProvider::new(MemoryProvider::<String>::with_name("contract"));
    common::check_async_contract(&cache).await;
}

#[tokio::test]
async fn test_sync_get_never_touches_backend() {
    let cache = CachedDataProvider::new(CountingProvider::new(Duration::ZERO));
    cache.provider().seed("k", "backend");

    assert_eq!(DataProvider::get(&cache, "k").unwrap(), None);
    assert!(!DataProvider::contains(&cache, "k").unwrap());
    assert_eq!(cache.provider().get_calls(), 0);

    assert_eq!(
        AsyncDataProvider::get(&cache, "k").await.unwrap().as_deref(),
        Some("backend")
    );
    assert_eq!(
        DataProvider::get(&cache, "k").unwrap().as_deref(),
        Some("backend")
    );
}

#[tokio::test]
async fn test_sync_put_is_visible_before_backend_write() {
    let cache = CachedDataProvider::new(CountingProvider::new(Duration::from_millis(100)));

    DataProvider::put(&cache, "k", "v".to_string()).unwrap();
    assert_eq!(DataProvider::get(&cache, "k").unwrap().as_deref(), Some("v"));
    assert_eq!(cache.provider().stored("k"), None);

    // 后端按提交顺序执行，之后提交的操作完成时写入已落地
    cache.provider().size().await.unwrap();
    assert_eq!(cache.provider().stored("k").as_deref(), Some("v"));
}

#[tokio::test]
async fn test_remove_invalidates_before_forwarding() {
    let cache = CachedDataProvider::new(CountingProvider::new(Duration::from_millis(100)));
    DataProvider::put(&cache, "k", "v".to_string()).unwrap();

    let removal = AsyncDataProvider::remove(&cache, "k");
    assert_eq!(DataProvider::get(&cache, "k").unwrap(), None);
    assert!(!DataProvider::contains(&cache, "k").unwrap());

    removal.await.unwrap();
    assert_eq!(cache.provider().stored("k"), None);
}

#[tokio::test]
async fn test_get_and_remove_returns_backend_value() {
    let cache = CachedDataProvider::new(MemoryProvider::<String>::with_name("take"));
    AsyncDataProvider::put(&cache, "k", "v".to_string())
        .await
        .unwrap();

    let taken = AsyncDataProvider::get_and_remove(&cache, "k").await.unwrap();
    assert_eq!(taken.as_deref(), Some("v"));
    assert_eq!(DataProvider::get(&cache, "k").unwrap(), None);
    assert!(!AsyncDataProvider::contains(&cache, "k").await.unwrap());
}

#[tokio::test]
async fn test_sync_get_and_remove_returns_cached_value() {
    let cache = CachedDataProvider::new(CountingProvider::new(Duration::ZERO));
    DataProvider::put(&cache, "k", "v".to_string()).unwrap();

    assert_eq!(
        DataProvider::get_and_remove(&cache, "k").unwrap().as_deref(),
        Some("v")
    );
    assert_eq!(DataProvider::get(&cache, "k").unwrap(), None);

    cache.provider().size().await.unwrap();
    assert_eq!(cache.provider().stored("k"), None);
}

#[tokio::test]
async fn test_put_with_updates_cache_when_producer_runs() {
    let cache = CachedDataProvider::new(CountingProvider::new(Duration::ZERO));

    AsyncDataProvider::put_with(&cache, "lazy", Box::new(|| Ok("made".to_string())))
        .await
        .unwrap();
    assert_eq!(
        DataProvider::get(&cache, "lazy").unwrap().as_deref(),
        Some("made")
    );
    assert_eq!(cache.provider().stored("lazy").as_deref(), Some("made"));

    let failed = AsyncDataProvider::put_with(
        &cache,
        "broken",
        Box::new(|| Err(DataError::Producer("cannot build".to_string()))),
    )
    .await;
    assert!(matches!(failed, Err(DataError::Producer(_))));
    assert_eq!(DataProvider::get(&cache, "broken").unwrap(), None);
    assert_eq!(cache.provider().stored("broken"), None);

    // 失败不会阻塞后续操作
    AsyncDataProvider::put(&cache, "after", "ok".to_string())
        .await
        .unwrap();
    assert_eq!(cache.provider().stored("after").as_deref(), Some("ok"));
}

#[tokio::test]
async fn test_put_all_writes_through() {
    let cache = CachedDataProvider::new(CountingProvider::new(Duration::ZERO));
    let batch = HashMap::from([
        ("a".to_string(), "1".to_string()),
        ("b".to_string(), "2".to_string()),
    ]);

    DataProvider::put_all(&cache, batch.clone()).unwrap();
    assert_eq!(DataProvider::entries(&cache).unwrap(), batch);
    assert_eq!(DataProvider::size(&cache).unwrap(), 2);

    cache.provider().size().await.unwrap();
    assert_eq!(cache.provider().stored("a").as_deref(), Some("1"));
    assert_eq!(cache.provider().stored("b").as_deref(), Some("2"));
}

#[tokio::test]
async fn test_async_enumeration_reflects_backend() {
    let cache = CachedDataProvider::new(CountingProvider::new(Duration::ZERO));
    for (k, v) in [("a", "1"), ("b", "2"), ("c", "3")] {
        cache.provider().seed(k, v);
    }

    // 同步枚举只看缓存，异步枚举看后端
    assert!(DataProvider::keys(&cache).unwrap().is_empty());
    assert_eq!(AsyncDataProvider::keys(&cache).await.unwrap().len(), 3);
    assert_eq!(AsyncDataProvider::size(&cache).await.unwrap(), 3);
    assert_eq!(AsyncDataProvider::entries(&cache).await.unwrap().len(), 3);
    assert!(AsyncDataProvider::contains(&cache, "b").await.unwrap());
}

#[tokio::test]
async fn test_invalidate_only_drops_cached_entry() {
    let cache = CachedDataProvider::new(CountingProvider::new(Duration::ZERO));
    AsyncDataProvider::put(&cache, "k", "v".to_string())
        .await
        .unwrap();

    cache.invalidate("k");
    assert_eq!(cache.get_if_present("k"), None);
    assert_eq!(cache.provider().stored("k").as_deref(), Some("v"));

    assert_eq!(
        cache.get_or_load("k").await.unwrap().as_deref(),
        Some("v")
    );
    assert_eq!(cache.provider().get_calls(), 1);

    AsyncDataProvider::put(&cache, "other", "w".to_string())
        .await
        .unwrap();
    cache.invalidate_all();
    assert_eq!(cache.get_if_present("k"), None);
    assert_eq!(cache.get_if_present("other"), None);
    assert_eq!(AsyncDataProvider::size(&cache).await.unwrap(), 2);
}

#[tokio::test]
async fn test_entries_expire_after_time_to_live() {
    let config = CacheConfig::default().with_time_to_live(Duration::from_secs(1));
    let cache = CachedDataProvider::with_config(
        "ttl",
        MemoryProvider::<String>::with_name("ttl"),
        config,
    )
    .unwrap();

    DataProvider::put(&cache, "k", "v".to_string()).unwrap();
    assert!(DataProvider::contains(&cache, "k").unwrap());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(DataProvider::get(&cache, "k").unwrap(), None);

    // 过期只影响缓存，读穿仍能取回
    assert_eq!(
        AsyncDataProvider::get(&cache, "k").await.unwrap().as_deref(),
        Some("v")
    );
}

#[tokio::test]
async fn test_max_entries_bounds_cache() {
    let config = CacheConfig::default().with_max_entries(10);
    let cache = CachedDataProvider::with_config(
        "bounded",
        MemoryProvider::<String>::with_name("bounded"),
        config,
    )
    .unwrap();

    for i in 0..200 {
        DataProvider::put(&cache, &format!("key_{}", i), i.to_string()).unwrap();
    }

    assert!(cache.entry_count() <= 10);
    assert_eq!(AsyncDataProvider::size(&cache).await.unwrap(), 200);
}

#[tokio::test]
async fn test_invalid_configuration_is_rejected() {
    let config = CacheConfig::default().with_load_timeout(Duration::ZERO);
    let result = CachedDataProvider::with_config(
        "invalid",
        MemoryProvider::<String>::with_name("invalid"),
        config,
    );
    assert!(matches!(result, Err(DataError::Configuration(_))));
}

#[tokio::test]
async fn test_empty_key_is_rejected() {
    let cache = CachedDataProvider::new(MemoryProvider::<String>::with_name("keys"));

    assert!(matches!(
        DataProvider::put(&cache, "", "v".to_string()),
        Err(DataError::InvalidKey(_))
    ));
    assert!(matches!(
        AsyncDataProvider::get(&cache, "").await,
        Err(DataError::InvalidKey(_))
    ));
    assert!(matches!(
        AsyncDataProvider::remove(&cache, "").await,
        Err(DataError::InvalidKey(_))
    ));
}

#[tokio::test]
async fn test_stats_track_hits_and_misses() {
    let cache = CachedDataProvider::new(CountingProvider::new(Duration::ZERO));
    cache.provider().seed("k", "v");

    AsyncDataProvider::get(&cache, "k").await.unwrap();
    AsyncDataProvider::get(&cache, "k").await.unwrap();
    AsyncDataProvider::get(&cache, "k").await.unwrap();

    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.loads, 1);
    assert_eq!(stats.load_failures, 0);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Profile {
    name: String,
    age: u32,
}

#[tokio::test]
async fn test_cache_over_mapped_provider() {
    let mapped: MappedProvider<_, _, String, Profile> = MappedProvider::new(
        MemoryProvider::<String>::with_name("profiles"),
        JsonMapper::<Profile>::new(),
    );
    let cache = CachedDataProvider::new(mapped);

    let alice = Profile {
        name: "alice".to_string(),
        age: 30,
    };
    AsyncDataProvider::put(&cache, "alice", alice.clone())
        .await
        .unwrap();

    let raw = DataProvider::get(cache.provider().inner(), "alice").unwrap();
    assert_eq!(raw.as_deref(), Some(r#"{"name":"alice","age":30}"#));

    cache.invalidate("alice");
    assert_eq!(AsyncDataProvider::get(&cache, "alice").await.unwrap(), Some(alice));
}

/// JSON 对象的键必须是字符串，这种值无法编码
type Unencodable = HashMap<Vec<u8>, u32>;

fn unencodable() -> Unencodable {
    HashMap::from([(vec![1u8], 3u32)])
}

#[tokio::test]
async fn test_failed_conversion_leaves_cache_untouched() {
    setup_logging();
    let mapped: MappedProvider<_, _, String, Unencodable> = MappedProvider::new(
        MemoryProvider::<String>::with_name("unencodable-cache"),
        JsonMapper::<Unencodable>::new(),
    );
    let cache = CachedDataProvider::new(mapped);

    let result = AsyncDataProvider::put(&cache, "k", unencodable()).await;
    assert!(matches!(result, Err(DataError::Conversion { .. })));
    assert_eq!(cache.get_if_present("k"), None);
    assert_eq!(AsyncDataProvider::get(&cache, "k").await.unwrap(), None);

    // 同步写入直接报告转换失败
    let result = DataProvider::put(&cache, "j", unencodable());
    assert!(matches!(result, Err(DataError::Conversion { .. })));
    assert_eq!(DataProvider::get(&cache, "j").unwrap(), None);

    let result = AsyncDataProvider::put_all(
        &cache,
        HashMap::from([("a".to_string(), unencodable())]),
    )
    .await;
    assert!(matches!(result, Err(DataError::Conversion { .. })));
    assert_eq!(cache.get_if_present("a"), None);

    // 延迟写入在执行上下文中转换，失败后撤销已放进缓存的值
    let result =
        AsyncDataProvider::put_with(&cache, "lazy", Box::new(|| Ok(unencodable()))).await;
    assert!(matches!(result, Err(DataError::Conversion { .. })));
    assert_eq!(cache.get_if_present("lazy"), None);

    assert_eq!(
        AsyncDataProvider::size(cache.provider().inner()).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn test_failed_backend_write_is_rolled_back() {
    let cache = CachedDataProvider::new(CountingProvider::new(Duration::ZERO));
    AsyncDataProvider::put(&cache, "k", "old".to_string())
        .await
        .unwrap();

    cache.provider().set_failing_writes(true);
    let result = AsyncDataProvider::put(&cache, "k", "new".to_string()).await;
    assert!(matches!(result, Err(DataError::Backend(_))));
    assert_eq!(cache.get_if_present("k"), None);
    assert_eq!(
        AsyncDataProvider::get(&cache, "k").await.unwrap().as_deref(),
        Some("old")
    );

    let result =
        AsyncDataProvider::put_with(&cache, "lazy", Box::new(|| Ok("made".to_string()))).await;
    assert!(matches!(result, Err(DataError::Backend(_))));
    assert_eq!(cache.get_if_present("lazy"), None);

    let batch = HashMap::from([
        ("a".to_string(), "1".to_string()),
        ("b".to_string(), "2".to_string()),
    ]);
    let result = AsyncDataProvider::put_all(&cache, batch.clone()).await;
    assert!(matches!(result, Err(DataError::Backend(_))));
    let result = AsyncDataProvider::put_all_with(&cache, Box::new(move || Ok(batch))).await;
    assert!(matches!(result, Err(DataError::Backend(_))));
    assert_eq!(cache.get_if_present("a"), None);
    assert_eq!(cache.get_if_present("b"), None);
}

#[tokio::test]
async fn test_sync_put_is_rolled_back_when_backend_write_fails() {
    let cache = CachedDataProvider::new(CountingProvider::new(Duration::from_millis(50)));
    cache.provider().set_failing_writes(true);

    DataProvider::put(&cache, "k", "v".to_string()).unwrap();
    assert_eq!(DataProvider::get(&cache, "k").unwrap().as_deref(), Some("v"));

    // 没有人等待的写入失败后也会撤销
    cache.provider().size().await.unwrap();
    for _ in 0..100 {
        if cache.get_if_present("k").is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(cache.get_if_present("k"), None);
    assert_eq!(cache.provider().stored("k"), None);
}

#[tokio::test]
async fn test_failed_write_keeps_newer_cached_value() {
    let cache = CachedDataProvider::new(CountingProvider::new(Duration::from_millis(20)));

    cache.provider().set_failing_writes(true);
    let first = AsyncDataProvider::put(&cache, "k", "first".to_string());
    cache.provider().set_failing_writes(false);
    let second = AsyncDataProvider::put(&cache, "k", "second".to_string());

    assert!(matches!(first.await, Err(DataError::Backend(_))));
    assert_eq!(cache.get_if_present("k").as_deref(), Some("second"));

    second.await.unwrap();
    assert_eq!(cache.provider().stored("k").as_deref(), Some("second"));
    assert_eq!(cache.get_if_present("k").as_deref(), Some("second"));
}

#[tokio::test]
async fn test_write_after_shutdown_is_reported() {
    let cache = CachedDataProvider::new(MemoryProvider::<String>::with_name("closed"));
    AsyncDataProvider::executor(&cache).shutdown().await.unwrap();

    assert!(matches!(
        DataProvider::put(&cache, "k", "v".to_string()),
        Err(DataError::Shutdown(_))
    ));
    assert_eq!(cache.get_if_present("k"), None);
    assert!(matches!(
        AsyncDataProvider::put(&cache, "k", "v".to_string()).await,
        Err(DataError::Shutdown(_))
    ));
    assert_eq!(cache.get_if_present("k"), None);
}
