//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 文件后端集成测试

#[path = "../common/mod.rs"]
mod common;

use common::setup_logging;
use oxdata::backend::file::{escape_key, FileDataProvider, MAX_FILE_NAME_LEN};
use oxdata::error::DataError;
use oxdata::provider::{AsyncDataProvider, DataProvider};
use oxdata::CachedDataProvider;
use tempfile::TempDir;

#[tokio::test]
async fn test_async_contract() {
    setup_logging();
    let dir = TempDir::new().unwrap();
    let provider = FileDataProvider::new(dir.path()).unwrap();
    common::check_async_contract(&provider).await;
}

#[tokio::test]
async fn test_sync_contract() {
    let dir = TempDir::new().unwrap();
    let provider = FileDataProvider::new(dir.path()).unwrap();
    common::check_sync_contract(&provider);
}

#[tokio::test]
async fn test_keys_with_separators_stay_flat() {
    let dir = TempDir::new().unwrap();
    let provider = FileDataProvider::new(dir.path()).unwrap();

    let keys = ["users/42", "../escape", ".hidden", "with space", "emoji-\u{1F600}"];
    for key in keys {
        AsyncDataProvider::put(&provider, key, format!("value of {}", key))
            .await
            .unwrap();
    }

    // 每个键都是数据目录下的一个普通文件
    let names: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap())
        .collect();
    assert_eq!(names.len(), keys.len());
    for entry in names {
        assert!(entry.file_type().unwrap().is_file());
    }
    assert!(dir.path().join(escape_key("users/42")).is_file());
    assert!(!dir.path().join("users").exists());

    let listed = AsyncDataProvider::keys(&provider).await.unwrap();
    for key in keys {
        assert!(listed.contains(key), "missing {}", key);
        assert_eq!(
            AsyncDataProvider::get(&provider, key).await.unwrap(),
            Some(format!("value of {}", key))
        );
    }
}

#[tokio::test]
async fn test_reading_missing_key_creates_nothing() {
    let dir = TempDir::new().unwrap();
    let provider = FileDataProvider::new(dir.path()).unwrap();

    assert_eq!(AsyncDataProvider::get(&provider, "nope").await.unwrap(), None);
    assert!(!AsyncDataProvider::contains(&provider, "nope").await.unwrap());
    AsyncDataProvider::remove(&provider, "nope").await.unwrap();

    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_foreign_files_are_ignored() {
    let dir = TempDir::new().unwrap();
    let provider = FileDataProvider::new(dir.path()).unwrap();

    AsyncDataProvider::put(&provider, "real", "1".to_string())
        .await
        .unwrap();
    std::fs::write(dir.path().join(".leftover.tmp"), "partial").unwrap();
    std::fs::write(dir.path().join("bad%zz"), "junk").unwrap();
    std::fs::create_dir(dir.path().join("subdir")).unwrap();

    let keys = AsyncDataProvider::keys(&provider).await.unwrap();
    assert_eq!(keys.len(), 1);
    assert!(keys.contains("real"));
    assert_eq!(AsyncDataProvider::size(&provider).await.unwrap(), 1);
    assert_eq!(DataProvider::entries(&provider).unwrap().len(), 1);
}

#[tokio::test]
async fn test_data_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let provider = FileDataProvider::new(dir.path()).unwrap();
        AsyncDataProvider::put(&provider, "persist", "yes".to_string())
            .await
            .unwrap();
        provider.executor().shutdown().await.unwrap();
    }

    let reopened = FileDataProvider::new(dir.path()).unwrap();
    assert_eq!(
        DataProvider::get(&reopened, "persist").unwrap().as_deref(),
        Some("yes")
    );
    assert_eq!(reopened.directory(), dir.path());
}

#[tokio::test]
async fn test_creates_missing_directory_and_rejects_files() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("a").join("b");
    let provider = FileDataProvider::new(&nested).unwrap();
    DataProvider::put(&provider, "k", "v".to_string()).unwrap();
    assert!(nested.join("k").is_file());

    let plain_file = dir.path().join("plain");
    std::fs::write(&plain_file, "not a directory").unwrap();
    assert!(FileDataProvider::new(&plain_file).is_err());
}

#[tokio::test]
async fn test_cache_over_file_backend() {
    let dir = TempDir::new().unwrap();
    let cache = CachedDataProvider::new(FileDataProvider::new(dir.path()).unwrap());

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
async fn test_key_with_overlong_file_name_is_rejected() {
    let dir = TempDir::new().unwrap();
    let provider = FileDataProvider::new(dir.path()).unwrap();
    // 每个字节转义成三个字节
    let key = "/".repeat(MAX_FILE_NAME_LEN / 3 + 1);

    assert!(matches!(
        DataProvider::put(&provider, &key, "v".to_string()),
        Err(DataError::InvalidKey(_))
    ));
    assert!(matches!(
        AsyncDataProvider::put(&provider, &key, "v".to_string()).await,
        Err(DataError::InvalidKey(_))
    ));
    assert!(matches!(
        AsyncDataProvider::get(&provider, &key).await,
        Err(DataError::InvalidKey(_))
    ));
    assert!(matches!(
        DataProvider::contains(&provider, &key),
        Err(DataError::InvalidKey(_))
    ));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

    let longest = "k".repeat(MAX_FILE_NAME_LEN);
    DataProvider::put(&provider, &longest, "v".to_string()).unwrap();
    assert_eq!(
        DataProvider::get(&provider, &longest).unwrap().as_deref(),
        Some("v")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sync_and_async_writes_to_one_key_do_not_collide() {
    let dir = TempDir::new().unwrap();
    let provider = std::sync::Arc::new(FileDataProvider::new(dir.path()).unwrap());

    let writer = {
        let provider = provider.clone();
        std::thread::spawn(move || {
            for i in 0..50 {
                DataProvider::put(provider.as_ref(), "shared", format!("sync-{}", i)).unwrap();
            }
        })
    };
    let mut pending = Vec::new();
    for i in 0..50 {
        pending.push(AsyncDataProvider::put(
            provider.as_ref(),
            "shared",
            format!("async-{}", i),
        ));
    }
    for completion in pending {
        completion.await.unwrap();
    }
    writer.join().unwrap();

    let value = DataProvider::get(provider.as_ref(), "shared").unwrap().unwrap();
    assert!(value.starts_with("sync-") || value.starts_with("async-"));
    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["shared".to_string()]);
}
