//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块为缓存装饰器实现同步与异步两套契约。
//!
//! 同步契约只操作缓存（写入与删除仍会提交到后端，但不等待结果）；
//! 异步契约在读取时穿透缓存，枚举类操作委托给后端。

use super::{CachedDataProvider, Slot};
use crate::error::{validate_key, Result};
use crate::executor::{Completion, Executor};
use crate::provider::{rejected, AsyncDataProvider, DataProvider, Producer};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

/// 已有结果时返回结果；仍在执行时放手，之后的失败由后台记录
fn settle(completion: Completion<()>) -> Result<()> {
    match completion.try_resolve() {
        Ok(result) => result,
        Err(_pending) => Ok(()),
    }
}

impl<V, P> DataProvider<V> for CachedDataProvider<V, P>
where
    V: Clone + Send + Sync + 'static,
    P: AsyncDataProvider<V>,
{
    /// 转换失败或后端已拒绝时返回错误，缓存不变
    fn put(&self, key: &str, value: V) -> Result<()> {
        validate_key(key)?;
        settle(self.write_through(key, value))
    }

    fn put_all(&self, entries: HashMap<String, V>) -> Result<()> {
        for key in entries.keys() {
            validate_key(key)?;
        }
        settle(self.write_all_through(entries))
    }

    fn get(&self, key: &str) -> Result<Option<V>> {
        validate_key(key)?;
        Ok(self.get_if_present(key))
    }

    fn contains(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        Ok(self
            .cache
            .get(key)
            .map(|slot| slot.value.is_some())
            .unwrap_or(false))
    }

    fn remove(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        settle(self.invalidate_then(key, || self.provider.remove(key)))
    }

    fn get_and_remove(&self, key: &str) -> Result<Option<V>> {
        validate_key(key)?;
        let (previous, removal) = self.loads.supersede(key, || {
            let previous = self.cache.remove(key).and_then(|slot| slot.value);
            (previous, self.provider.remove(key))
        });
        settle(removal)?;
        Ok(previous)
    }

    fn keys(&self) -> Result<HashSet<String>> {
        Ok(self
            .cache
            .iter()
            .filter(|(_, slot)| slot.value.is_some())
            .map(|(key, _)| (*key).clone())
            .collect())
    }

    fn entries(&self) -> Result<HashMap<String, V>> {
        Ok(self
            .cache
            .iter()
            .filter_map(|(key, slot)| slot.value.map(|value| ((*key).clone(), value)))
            .collect())
    }

    fn size(&self) -> Result<usize> {
        Ok(self
            .cache
            .iter()
            .filter(|(_, slot)| slot.value.is_some())
            .count())
    }
}

impl<V, P> AsyncDataProvider<V> for CachedDataProvider<V, P>
where
    V: Clone + Send + Sync + 'static,
    P: AsyncDataProvider<V>,
{
    fn executor(&self) -> &Executor {
        self.provider.executor()
    }

    fn put(&self, key: &str, value: V) -> Completion<()> {
        self.write_through(key, value)
    }

    /// 生产者在后端的执行上下文中运行，产出的值在那一刻写入缓存，随后由后端写入
    ///
    /// 生产、转换或后端写入任一步失败，都会在句柄解析前撤销该值。
    fn put_with(&self, key: &str, producer: Producer<V>) -> Completion<()> {
        if let Some(rejected) = rejected(key) {
            return rejected;
        }
        let cache = self.cache.clone();
        let loads = self.loads.clone();
        let owned_key = key.to_string();
        let stamp = self.next_stamp();
        let pending = self.provider.put_with(
            key,
            Box::new(move || {
                let value = producer()?;
                loads.supersede(&owned_key, || {
                    cache.insert(owned_key.clone(), Slot::written(value.clone(), stamp));
                });
                Ok(value)
            }),
        );
        self.guard_write(Arc::new(Mutex::new(vec![(key.to_string(), stamp)])), pending)
    }

    fn put_all(&self, entries: HashMap<String, V>) -> Completion<()> {
        self.write_all_through(entries)
    }

    fn put_all_with(&self, producer: Producer<HashMap<String, V>>) -> Completion<()> {
        let cache = self.cache.clone();
        let loads = self.loads.clone();
        let stamps = self.stamps.clone();
        let written = Arc::new(Mutex::new(Vec::new()));
        let recorded = written.clone();
        let pending = self.provider.put_all_with(Box::new(move || {
            let entries = producer()?;
            for key in entries.keys() {
                validate_key(key)?;
            }
            let mut stamped = Vec::with_capacity(entries.len());
            for (key, value) in &entries {
                let stamp = stamps.fetch_add(1, Ordering::Relaxed);
                loads.supersede(key, || {
                    cache.insert(key.clone(), Slot::written(value.clone(), stamp));
                });
                stamped.push((key.clone(), stamp));
            }
            recorded
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .extend(stamped);
            Ok(entries)
        }));
        self.guard_write(written, pending)
    }

    fn get(&self, key: &str) -> Completion<Option<V>> {
        self.load_through(key)
    }

    fn contains(&self, key: &str) -> Completion<bool> {
        self.provider.contains(key)
    }

    fn remove(&self, key: &str) -> Completion<()> {
        if let Some(rejected) = rejected(key) {
            return rejected;
        }
        self.invalidate_then(key, || self.provider.remove(key))
    }

    fn get_and_remove(&self, key: &str) -> Completion<Option<V>> {
        if let Some(rejected) = rejected(key) {
            return rejected;
        }
        self.invalidate_then(key, || self.provider.get_and_remove(key))
    }

    fn keys(&self) -> Completion<HashSet<String>> {
        self.provider.keys()
    }

    fn entries(&self) -> Completion<HashMap<String, V>> {
        self.provider.entries()
    }

    fn size(&self) -> Completion<usize> {
        self.provider.size()
    }
}
