//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! Redis后端集成测试，Redis不可用时跳过

#[path = "../common/mod.rs"]
mod common;

use common::{generate_unique_name, is_redis_available, redis_url, setup_logging};
use oxdata::backend::redis::RedisDataProvider;
use oxdata::config::RedisConfig;
use oxdata::provider::{AsyncDataProvider, DataProvider};
use oxdata::CachedDataProvider;
use std::sync::Arc;

async fn provider_with_prefix(prefix: &str) -> RedisDataProvider {
    let config = RedisConfig {
        connection_string: redis_url().into(),
        key_prefix: prefix.to_string(),
        ..Default::default()
    };
    RedisDataProvider::connect(&config)
        .await
        .expect("Failed to connect to Redis")
}

async fn cleanup(provider: &RedisDataProvider) {
    for key in provider.keys().await.unwrap_or_default() {
        let _ = provider.remove(&key).await;
    }
}

#[tokio::test]
async fn test_async_contract() {
    setup_logging();

    if !is_redis_available().await {
        println!("Skipping test_async_contract because Redis is not available");
        return;
    }

    let prefix = format!("{}:", generate_unique_name("contract"));
    let provider = provider_with_prefix(&prefix).await;
    common::check_async_contract(&provider).await;
    cleanup(&provider).await;
}

#[tokio::test]
async fn test_prefixes_isolate_key_spaces() {
    if !is_redis_available().await {
        println!("Skipping test_prefixes_isolate_key_spaces because Redis is not available");
        return;
    }

    let base = generate_unique_name("isolation");
    let first = provider_with_prefix(&format!("{}:a:", base)).await;
    // 前缀中的 glob 字符按字面匹配
    let second = provider_with_prefix(&format!("{}:[b]*:", base)).await;

    first.put("k", "first".to_string()).await.unwrap();
    second.put("k", "second".to_string()).await.unwrap();
    second.put("only_second", "x".to_string()).await.unwrap();

    assert_eq!(first.get("k").await.unwrap().as_deref(), Some("first"));
    assert_eq!(second.get("k").await.unwrap().as_deref(), Some("second"));
    assert_eq!(first.size().await.unwrap(), 1);
    assert_eq!(second.size().await.unwrap(), 2);
    assert!(!first.contains("only_second").await.unwrap());

    cleanup(&first).await;
    cleanup(&second).await;
}

#[tokio::test]
async fn test_get_and_remove_hands_value_to_one_caller() {
    if !is_redis_available().await {
        println!("Skipping test_get_and_remove_hands_value_to_one_caller because Redis is not available");
        return;
    }

    let prefix = format!("{}:", generate_unique_name("take"));
    let provider = Arc::new(provider_with_prefix(&prefix).await);
    provider.put("token", "secret".to_string()).await.unwrap();

    let takers: Vec<_> = (0..10).map(|_| provider.get_and_remove("token")).collect();
    let taken: Vec<_> = futures::future::join_all(takers)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .filter(Option::is_some)
        .collect();

    assert_eq!(taken.len(), 1);
    assert!(!provider.contains("token").await.unwrap());
}

#[tokio::test]
async fn test_entries_over_many_keys() {
    if !is_redis_available().await {
        println!("Skipping test_entries_over_many_keys because Redis is not available");
        return;
    }

    let prefix = format!("{}:", generate_unique_name("bulk"));
    let provider = provider_with_prefix(&prefix).await;

    // 超过一次 MGET 的批量
    let batch: std::collections::HashMap<_, _> = (0..1200)
        .map(|i| (format!("key_{}", i), format!("value_{}", i)))
        .collect();
    provider.put_all(batch.clone()).await.unwrap();

    assert_eq!(provider.size().await.unwrap(), 1200);
    assert_eq!(provider.entries().await.unwrap(), batch);

    cleanup(&provider).await;
    assert_eq!(provider.size().await.unwrap(), 0);
}

#[tokio::test]
async fn test_cache_over_redis_backend() {
    if !is_redis_available().await {
        println!("Skipping test_cache_over_redis_backend because Redis is not available");
        return;
    }

    let prefix = format!("{}:", generate_unique_name("cached"));
    let cache = CachedDataProvider::new(provider_with_prefix(&prefix).await);

    DataProvider::put(&cache, "x", "1".to_string()).unwrap();
    assert_eq!(
        AsyncDataProvider::get(&cache, "x").await.unwrap().as_deref(),
        Some("1")
    );
    AsyncDataProvider::remove(&cache, "x").await.unwrap();
    assert_eq!(AsyncDataProvider::get(&cache, "x").await.unwrap(), None);
    assert_eq!(AsyncDataProvider::size(&cache).await.unwrap(), 0);
}
