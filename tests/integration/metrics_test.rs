//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 指标收集集成测试

use oxdata::metrics::{get_metrics_string, GLOBAL_METRICS};
use oxdata::provider::{AsyncDataProvider, MemoryProvider};
use oxdata::CachedDataProvider;

#[test]
fn test_metrics_recording() {
    GLOBAL_METRICS.record_request("metrics_test", "get", "hit");
    GLOBAL_METRICS.record_duration("metrics_test", "get", 0.005);
    GLOBAL_METRICS.set_cache_entries("metrics_test_cache", 42);

    let output = get_metrics_string();

    println!("Metrics output:\n{}", output);

    assert!(output.contains(
        "data_requests_total{provider=\"metrics_test\", operation=\"get\", result=\"hit\"} 1"
    ));
    assert!(output.contains(
        "data_operation_duration_seconds_sum{provider=\"metrics_test\", operation=\"get\"} 0.005"
    ));
    assert!(output.contains(
        "data_operation_duration_seconds_count{provider=\"metrics_test\", operation=\"get\"} 1"
    ));
    assert!(output.contains("data_cache_entries{cache=\"metrics_test_cache\"} 42"));
}

#[tokio::test]
async fn test_executor_and_cache_report_requests() {
    let provider = MemoryProvider::<String>::with_name("metrics_provider");
    let cache = CachedDataProvider::with_config(
        "metrics_cache",
        provider,
        Default::default(),
    )
    .unwrap();

    AsyncDataProvider::put(&cache, "k", "v".to_string())
        .await
        .unwrap();
    AsyncDataProvider::get(&cache, "k").await.unwrap();
    AsyncDataProvider::get(&cache, "missing").await.unwrap();

    assert_eq!(
        GLOBAL_METRICS.request_count("metrics_provider", "put", "success"),
        1
    );
    assert_eq!(GLOBAL_METRICS.request_count("metrics_cache", "get", "hit"), 1);
    assert_eq!(GLOBAL_METRICS.request_count("metrics_cache", "get", "miss"), 1);
    assert_eq!(
        GLOBAL_METRICS.request_count("metrics_cache", "load", "success"),
        1
    );
}
