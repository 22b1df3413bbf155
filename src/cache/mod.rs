//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了旁路缓存装饰器。
//!
//! [`CachedDataProvider`] 包在任意 [`AsyncDataProvider`] 外层：
//! - 写入先由被装饰提供者完成校验与转换，再更新缓存并提交后端写入；
//!   后端写入失败时撤销仍属于该次写入的缓存槽；
//! - 删除先失效缓存，再转发给后端；
//! - 同步契约的读取只看缓存，异步契约的读取在未命中时按键合并加载。
//!
//! 两个契约的实现见 `composite` 子模块。

mod composite;
mod single_flight;

use crate::config::CacheConfig;
use crate::error::{validate_key, DataError, Result};
use crate::executor::Completion;
use crate::metrics::GLOBAL_METRICS;
use crate::provider::AsyncDataProvider;
use futures::FutureExt;
use moka::sync::Cache;
use single_flight::{Joined, SharedLoad, SingleFlight};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, instrument, warn};

/// 缓存槽
///
/// `value` 为 `None` 表示后端确认不存在。`stamp` 标识写入该槽的写操作，加载回填的槽为 0。
#[derive(Clone)]
struct Slot<V> {
    value: Option<V>,
    stamp: u64,
}

impl<V> Slot<V> {
    fn loaded(value: Option<V>) -> Self {
        Self { value, stamp: 0 }
    }

    fn written(value: V, stamp: u64) -> Self {
        Self {
            value: Some(value),
            stamp,
        }
    }
}

/// 一次写入放进缓存的键及其写入标记
type WrittenSlots = Arc<Mutex<Vec<(String, u64)>>>;

/// 缓存统计
#[derive(Debug, Default)]
struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    load_failures: AtomicU64,
    coalesced: AtomicU64,
}

/// 缓存统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// 缓存命中（含确认不存在的条目）
    pub hits: u64,
    /// 缓存未命中
    pub misses: u64,
    /// 发起的后端加载次数
    pub loads: u64,
    /// 失败的后端加载次数
    pub load_failures: u64,
    /// 加入已有加载而未发起新加载的次数
    pub coalesced: u64,
}

/// 旁路缓存装饰器
///
/// 缓存条目为 `Option<V>`，`None` 表示后端确认不存在。失败的加载不会进入缓存。
pub struct CachedDataProvider<V, P>
where
    V: Clone + Send + Sync + 'static,
{
    name: String,
    provider: P,
    cache: Cache<String, Slot<V>>,
    loads: Arc<SingleFlight<V>>,
    stats: Arc<StatsCounters>,
    stamps: Arc<AtomicU64>,
    runtime: Option<Handle>,
    config: CacheConfig,
    _marker: PhantomData<fn() -> V>,
}

impl<V, P> CachedDataProvider<V, P>
where
    V: Clone + Send + Sync + 'static,
    P: AsyncDataProvider<V>,
{
    /// 使用默认配置创建缓存装饰器
    pub fn new(provider: P) -> Self {
        Self::build("cache", provider, CacheConfig::default())
    }

    /// 使用指定配置创建缓存装饰器
    ///
    /// # 参数
    ///
    /// * `name` - 缓存名称，用于日志和指标
    /// * `provider` - 被装饰的提供者
    /// * `config` - 缓存配置
    ///
    /// # 返回值
    ///
    /// 配置非法时返回 `Configuration` 错误
    pub fn with_config(name: &str, provider: P, config: CacheConfig) -> Result<Self> {
        config.validate().map_err(DataError::Configuration)?;
        Ok(Self::build(name, provider, config))
    }

    fn build(name: &str, provider: P, config: CacheConfig) -> Self {
        let mut builder = Cache::builder();
        if let Some(max_entries) = config.max_entries {
            builder = builder.max_capacity(max_entries);
        }
        if let Some(ttl) = config.time_to_live() {
            builder = builder.time_to_live(ttl);
        }
        if let Some(tti) = config.time_to_idle() {
            builder = builder.time_to_idle(tti);
        }

        debug!(
            "Cache {} created (max_entries={:?}, ttl={:?}, tti={:?}, load_timeout={:?})",
            name,
            config.max_entries,
            config.time_to_live(),
            config.time_to_idle(),
            config.load_timeout()
        );

        Self {
            name: name.to_string(),
            provider,
            cache: builder.build(),
            loads: Arc::new(SingleFlight::new()),
            stats: Arc::new(StatsCounters::default()),
            stamps: Arc::new(AtomicU64::new(1)),
            runtime: Handle::try_current().ok(),
            config,
            _marker: PhantomData,
        }
    }

    /// 缓存名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 被装饰的提供者
    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// 统计快照
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            loads: self.stats.loads.load(Ordering::Relaxed),
            load_failures: self.stats.load_failures.load(Ordering::Relaxed),
            coalesced: self.stats.coalesced.load(Ordering::Relaxed),
        }
    }

    /// 进行中的加载数
    pub fn pending_loads(&self) -> usize {
        self.loads.len()
    }

    /// 当前缓存条目数（含确认不存在的条目），会先处理待执行的淘汰
    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        let count = self.cache.entry_count();
        GLOBAL_METRICS.set_cache_entries(&self.name, count);
        count
    }

    /// 只读缓存，不触发加载
    ///
    /// 未缓存与确认不存在都返回 `None`。
    pub fn get_if_present(&self, key: &str) -> Option<V> {
        self.cache.get(key).and_then(|slot| slot.value)
    }

    /// 读穿缓存，未命中时合并加载
    pub fn get_or_load(&self, key: &str) -> Completion<Option<V>> {
        self.load_through(key)
    }

    /// 只失效缓存条目，不触碰后端
    pub fn invalidate(&self, key: &str) {
        self.loads.supersede(key, || self.cache.invalidate(key));
    }

    /// 失效所有缓存条目，不触碰后端
    pub fn invalidate_all(&self) {
        self.loads.clear();
        self.cache.invalidate_all();
    }

    fn record(&self, op: &str, result: &str) {
        GLOBAL_METRICS.record_request(&self.name, op, result);
    }

    #[instrument(skip(self), level = "debug", fields(cache = %self.name))]
    fn load_through(&self, key: &str) -> Completion<Option<V>> {
        if let Err(e) = validate_key(key) {
            return Completion::ready(Err(e));
        }

        if let Some(slot) = self.cache.get(key) {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            self.record("get", "hit");
            debug!("cache hit");
            return Completion::ready(Ok(slot.value));
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        self.record("get", "miss");

        let joined = self.loads.join_or_start(
            key,
            || self.cache.get(key).map(|slot| slot.value),
            |id| self.start_load(key, id),
        );

        match joined {
            Joined::Resolved(slot) => Completion::ready(Ok(slot)),
            Joined::Waiting { load, started } => {
                if !started {
                    self.stats.coalesced.fetch_add(1, Ordering::Relaxed);
                    self.record("get", "coalesced");
                    debug!("joined in-flight load");
                }
                Completion::from_future(async move { load.await.map_err(DataError::Load) })
            }
        }
    }

    /// 发起一次后端加载
    ///
    /// 在单飞表的条目锁下调用，后端读取在此刻提交，保证与同键写入的顺序。
    fn start_load(&self, key: &str, id: u64) -> SharedLoad<V> {
        self.stats.loads.fetch_add(1, Ordering::Relaxed);
        debug!("starting load {} for key {}", id, key);

        let pending = self.provider.get(key);
        let cache = self.cache.clone();
        let loads = self.loads.clone();
        let stats = self.stats.clone();
        let name = self.name.clone();
        let timeout = self.config.load_timeout();
        let key = key.to_string();

        let load = async move {
            let outcome = match tokio::time::timeout(timeout, pending).await {
                Ok(result) => result,
                Err(_) => Err(DataError::Timeout(format!(
                    "load of key '{}' did not complete within {:?}",
                    key, timeout
                ))),
            };

            match outcome {
                Ok(value) => {
                    let populated = loads.complete(&key, id, || {
                        cache.insert(key.clone(), Slot::loaded(value.clone()));
                    });
                    if !populated {
                        debug!("load {} for key {} was superseded by a write", id, key);
                    }
                    GLOBAL_METRICS.record_request(&name, "load", "success");
                    Ok(value)
                }
                Err(e) => {
                    loads.abandon(&key, id);
                    stats.load_failures.fetch_add(1, Ordering::Relaxed);
                    GLOBAL_METRICS.record_request(&name, "load", "failure");
                    warn!("Cache {} failed to load key {}: {}", name, key, e);
                    Err(Arc::new(e))
                }
            }
        }
        .boxed()
        .shared();

        // 加载不依赖等待者驱动，等待者全部放弃时也会完成并回填
        tokio::spawn(load.clone());
        load
    }

    fn next_stamp(&self) -> u64 {
        self.stamps.fetch_add(1, Ordering::Relaxed)
    }

    /// 写入缓存并把后端写入提交给被装饰的提供者
    ///
    /// 值转换在拿条目锁之前完成，转换失败时缓存不变。
    fn write_through(&self, key: &str, value: V) -> Completion<()> {
        let submit = match self.provider.prepare_put(key, value.clone()) {
            Ok(submit) => submit,
            Err(e) => return Completion::ready(Err(e)),
        };
        let stamp = self.next_stamp();
        let pending = self.loads.supersede(key, || {
            self.cache
                .insert(key.to_string(), Slot::written(value, stamp));
            submit()
        });
        self.guard_write(Arc::new(Mutex::new(vec![(key.to_string(), stamp)])), pending)
    }

    fn write_all_through(&self, entries: HashMap<String, V>) -> Completion<()> {
        let submit = match self.provider.prepare_put_all(entries.clone()) {
            Ok(submit) => submit,
            Err(e) => return Completion::ready(Err(e)),
        };
        let mut written = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let stamp = self.next_stamp();
            self.loads.supersede(&key, || {
                self.cache.insert(key.clone(), Slot::written(value, stamp));
            });
            written.push((key, stamp));
        }
        self.guard_write(Arc::new(Mutex::new(written)), submit())
    }

    /// 后端写入失败时撤销该次写入放进缓存的槽
    ///
    /// 已经失败的写入当场撤销；仍在执行的写入由后台任务等待，调用方丢弃句柄也会撤销。
    fn guard_write(&self, written: WrittenSlots, pending: Completion<()>) -> Completion<()> {
        let rollback = WriteRollback {
            name: self.name.clone(),
            cache: self.cache.clone(),
            loads: self.loads.clone(),
            written,
        };

        let pending = match pending.try_resolve() {
            Ok(result) => {
                if let Err(e) = &result {
                    rollback.run(e);
                }
                return Completion::ready(result);
            }
            Err(pending) => pending,
        };

        let guarded = async move {
            let result = pending.await;
            if let Err(e) = &result {
                rollback.run(e);
            }
            result
        };

        match Handle::try_current().ok().or_else(|| self.runtime.clone()) {
            Some(runtime) => {
                let (tx, rx) = oneshot::channel();
                runtime.spawn(async move {
                    // 没有等待者时失败已由回滚记录
                    let _ = tx.send(guarded.await);
                });
                let name = self.name.clone();
                Completion::from_future(async move {
                    rx.await.map_err(|_| {
                        DataError::Shutdown(format!("cache {} lost a pending write", name))
                    })?
                })
            }
            None => Completion::from_future(guarded),
        }
    }

    /// 先失效缓存，再执行转发给后端的操作
    fn invalidate_then<T>(&self, key: &str, forward: impl FnOnce() -> T) -> T {
        self.loads.supersede(key, || {
            self.cache.invalidate(key);
            forward()
        })
    }
}

/// 写入失败后的缓存回滚
struct WriteRollback<V>
where
    V: Clone + Send + Sync + 'static,
{
    name: String,
    cache: Cache<String, Slot<V>>,
    loads: Arc<SingleFlight<V>>,
    written: WrittenSlots,
}

impl<V> WriteRollback<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// 只失效标记仍属于该次写入的槽，之后的写入或加载结果保持不变
    fn run(&self, error: &DataError) {
        let written = {
            let mut guard = self
                .written
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *guard)
        };

        let mut dropped = 0;
        for (key, stamp) in &written {
            let ours = self.loads.locked(key, || {
                let ours = self
                    .cache
                    .get(key)
                    .map(|slot| slot.stamp == *stamp)
                    .unwrap_or(false);
                if ours {
                    self.cache.invalidate(key);
                }
                ours
            });
            if ours {
                dropped += 1;
            }
        }

        GLOBAL_METRICS.record_request(&self.name, "write", "failure");
        warn!(
            "Cache {} write failed, dropped {} of {} cached entries: {}",
            self.name,
            dropped,
            written.len(),
            error
        );
    }
}

impl<V, P> std::fmt::Debug for CachedDataProvider<V, P>
where
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedDataProvider")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
