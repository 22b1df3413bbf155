//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 内存提供者集成测试

#[path = "../common/mod.rs"]
mod common;

use common::setup_logging;
use oxdata::error::DataError;
use oxdata::provider::{AsyncDataProvider, DataProvider, MemoryProvider};
use std::collections::HashMap;
use std::sync::Arc;

#[tokio::test]
async fn test_async_contract() {
    setup_logging();
    let provider = MemoryProvider::<String>::with_name("memory-async");
    common::check_async_contract(&provider).await;
}

#[tokio::test]
async fn test_sync_contract() {
    let provider = MemoryProvider::<String>::with_name("memory-sync");
    common::check_sync_contract(&provider);
}

#[tokio::test]
async fn test_contract_through_shared_handle() {
    let provider: Arc<dyn AsyncDataProvider<String>> =
        Arc::new(MemoryProvider::<String>::with_name("memory-dyn"));
    common::check_async_contract(&provider).await;
}

#[tokio::test]
async fn test_sync_and_async_views_share_data() {
    let provider = MemoryProvider::<u64>::with_name("memory-shared");

    DataProvider::put(&provider, "counter", 1).unwrap();
    assert_eq!(
        AsyncDataProvider::get(&provider, "counter").await.unwrap(),
        Some(1)
    );

    AsyncDataProvider::put(&provider, "counter", 2).await.unwrap();
    assert_eq!(DataProvider::get(&provider, "counter").unwrap(), Some(2));
    assert_eq!(DataProvider::size(&provider).unwrap(), 1);
}

#[tokio::test]
async fn test_from_map_seeds_entries() {
    let seed = HashMap::from([
        ("a".to_string(), "1".to_string()),
        ("b".to_string(), "2".to_string()),
    ]);
    let provider = MemoryProvider::from_map("memory-seeded", seed.clone());

    assert_eq!(AsyncDataProvider::entries(&provider).await.unwrap(), seed);
    assert_eq!(provider.executor().name(), "memory-seeded");
}

#[tokio::test]
async fn test_bulk_write_with_invalid_key_writes_nothing() {
    let provider = MemoryProvider::<String>::with_name("memory-bulk");
    let batch = HashMap::from([
        ("good".to_string(), "1".to_string()),
        (String::new(), "2".to_string()),
    ]);

    let result = AsyncDataProvider::put_all(&provider, batch).await;
    assert!(matches!(result, Err(DataError::InvalidKey(_))));
    assert_eq!(AsyncDataProvider::size(&provider).await.unwrap(), 0);
}

#[tokio::test]
async fn test_operations_fail_after_shutdown() {
    let provider = MemoryProvider::<String>::with_name("memory-closed");
    AsyncDataProvider::put(&provider, "k", "v".to_string())
        .await
        .unwrap();

    provider.executor().shutdown().await.unwrap();

    assert!(matches!(
        AsyncDataProvider::get(&provider, "k").await,
        Err(DataError::Shutdown(_))
    ));
}
