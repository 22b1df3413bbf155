//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了数据访问层的指标收集功能。

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{span, Level};

/// 指标收集器
///
/// 用于收集提供者和缓存装饰器的运行时指标
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    /// 请求总数统计
    /// key: "provider:op:result"
    pub requests_total: Arc<Mutex<HashMap<String, u64>>>,
    /// 操作耗时，key: "provider:op" -> (total_duration_secs, count)
    pub operation_duration: Arc<Mutex<HashMap<String, (f64, u64)>>>,
    /// 缓存条目数，key: 缓存名称
    pub cache_entries: Arc<Mutex<HashMap<String, u64>>>,
}

lazy_static! {
    /// 全局指标实例
    pub static ref GLOBAL_METRICS: Metrics = Metrics::default();
}

impl Metrics {
    /// 记录请求指标
    ///
    /// # 参数
    ///
    /// * `provider` - 提供者或缓存名称
    /// * `op` - 操作类型（get/put/remove/...）
    /// * `result` - 操作结果（success/failure/hit/miss/coalesced）
    pub fn record_request(&self, provider: &str, op: &str, result: &str) {
        let span = span!(Level::TRACE, "data_request", provider, op, result);
        let _enter = span.enter();
        let key = format!("{}:{}:{}", provider, op, result);
        if let Ok(mut map) = self.requests_total.lock() {
            *map.entry(key).or_insert(0) += 1;
        }
    }

    /// 记录操作耗时
    pub fn record_duration(&self, provider: &str, op: &str, duration_secs: f64) {
        let key = format!("{}:{}", provider, op);
        if let Ok(mut map) = self.operation_duration.lock() {
            let entry = map.entry(key).or_insert((0.0, 0));
            entry.0 += duration_secs;
            entry.1 += 1;
        }
    }

    /// 设置缓存条目数
    pub fn set_cache_entries(&self, cache: &str, entries: u64) {
        if let Ok(mut map) = self.cache_entries.lock() {
            map.insert(cache.to_string(), entries);
        }
    }

    /// 读取某个请求计数，不存在时为 0
    pub fn request_count(&self, provider: &str, op: &str, result: &str) -> u64 {
        let key = format!("{}:{}:{}", provider, op, result);
        self.requests_total
            .lock()
            .ok()
            .and_then(|map| map.get(&key).copied())
            .unwrap_or(0)
    }
}

/// 获取指标字符串
///
/// 将所有指标格式化为 Prometheus 文本格式
///
/// # 返回值
///
/// 返回包含所有指标的字符串
pub fn get_metrics_string() -> String {
    let metrics = &GLOBAL_METRICS;
    let mut output = String::new();

    if let Ok(reqs) = metrics.requests_total.lock() {
        let mut keys: Vec<_> = reqs.keys().collect();
        keys.sort();
        for k in keys {
            let parts: Vec<&str> = k.rsplitn(3, ':').collect();
            if let [result, op, provider] = parts.as_slice() {
                output.push_str(&format!(
                    "data_requests_total{{provider=\"{}\", operation=\"{}\", result=\"{}\"}} {}\n",
                    provider, op, result, reqs[k]
                ));
            }
        }
    }

    if let Ok(dur) = metrics.operation_duration.lock() {
        let mut keys: Vec<_> = dur.keys().collect();
        keys.sort();
        for k in keys {
            if let Some((provider, op)) = k.rsplit_once(':') {
                let (total, count) = dur[k];
                output.push_str(&format!(
                    "data_operation_duration_seconds_sum{{provider=\"{}\", operation=\"{}\"}} {}\n",
                    provider, op, total
                ));
                output.push_str(&format!(
                    "data_operation_duration_seconds_count{{provider=\"{}\", operation=\"{}\"}} {}\n",
                    provider, op, count
                ));
            }
        }
    }

    if let Ok(entries) = metrics.cache_entries.lock() {
        for (k, v) in entries.iter() {
            output.push_str(&format!("data_cache_entries{{cache=\"{}\"}} {}\n", k, v));
        }
    }

    output
}
