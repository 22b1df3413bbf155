//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于内存映射的数据提供者。

use super::{rejected, AsyncDataProvider, DataProvider, Producer};
use crate::error::{validate_key, Result};
use crate::executor::{Completion, Executor};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::instrument;

/// 内存数据提供者
///
/// 基于 `DashMap`，同时实现同步与异步契约。异步操作与同步操作共享同一份数据。
pub struct MemoryProvider<V> {
    map: Arc<DashMap<String, V>>,
    executor: Executor,
}

impl<V> MemoryProvider<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// 创建空的内存提供者，需要在 tokio 运行时内调用
    pub fn new() -> Self {
        Self::with_name("memory")
    }

    /// 创建指定执行上下文名称的内存提供者
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            map: Arc::new(DashMap::new()),
            executor: Executor::new(name),
        }
    }

    /// 由已有映射创建
    pub fn from_map(name: impl Into<String>, entries: HashMap<String, V>) -> Self {
        let provider = Self::with_name(name);
        for (key, value) in entries {
            provider.map.insert(key, value);
        }
        provider
    }

    fn submit<T, F>(&self, operation: &'static str, work: F) -> Completion<T>
    where
        T: Send + 'static,
        F: FnOnce(&DashMap<String, V>) -> Result<T> + Send + 'static,
    {
        let map = self.map.clone();
        self.executor
            .submit(operation, async move { work(&map) })
    }
}

impl<V> Default for MemoryProvider<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

fn snapshot<V: Clone>(map: &DashMap<String, V>) -> HashMap<String, V> {
    map.iter()
        .map(|e| (e.key().clone(), e.value().clone()))
        .collect()
}

fn key_set<V>(map: &DashMap<String, V>) -> HashSet<String> {
    map.iter().map(|e| e.key().clone()).collect()
}

impl<V> DataProvider<V> for MemoryProvider<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn put(&self, key: &str, value: V) -> Result<()> {
        validate_key(key)?;
        self.map.insert(key.to_string(), value);
        Ok(())
    }

    fn put_all(&self, entries: HashMap<String, V>) -> Result<()> {
        for key in entries.keys() {
            validate_key(key)?;
        }
        for (key, value) in entries {
            self.map.insert(key, value);
        }
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<V>> {
        validate_key(key)?;
        Ok(self.map.get(key).map(|v| v.value().clone()))
    }

    fn contains(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        Ok(self.map.contains_key(key))
    }

    fn remove(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.map.remove(key);
        Ok(())
    }

    fn get_and_remove(&self, key: &str) -> Result<Option<V>> {
        validate_key(key)?;
        Ok(self.map.remove(key).map(|(_, v)| v))
    }

    fn keys(&self) -> Result<HashSet<String>> {
        Ok(key_set(&self.map))
    }

    fn entries(&self) -> Result<HashMap<String, V>> {
        Ok(snapshot(&self.map))
    }

    fn size(&self) -> Result<usize> {
        Ok(self.map.len())
    }
}

impl<V> AsyncDataProvider<V> for MemoryProvider<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn executor(&self) -> &Executor {
        &self.executor
    }

    #[instrument(skip(self, producer), level = "trace", fields(executor = %self.executor.name()))]
    fn put_with(&self, key: &str, producer: Producer<V>) -> Completion<()> {
        if let Some(rejected) = rejected(key) {
            return rejected;
        }
        let key = key.to_string();
        self.submit("put", move |map| {
            map.insert(key, producer()?);
            Ok(())
        })
    }

    fn put_all_with(&self, producer: Producer<HashMap<String, V>>) -> Completion<()> {
        self.submit("put_all", move |map| {
            let entries = producer()?;
            for key in entries.keys() {
                validate_key(key)?;
            }
            for (key, value) in entries {
                map.insert(key, value);
            }
            Ok(())
        })
    }

    #[instrument(skip(self), level = "trace", fields(executor = %self.executor.name()))]
    fn get(&self, key: &str) -> Completion<Option<V>> {
        if let Some(rejected) = rejected(key) {
            return rejected;
        }
        let key = key.to_string();
        self.submit("get", move |map| Ok(map.get(&key).map(|v| v.value().clone())))
    }

    fn contains(&self, key: &str) -> Completion<bool> {
        if let Some(rejected) = rejected(key) {
            return rejected;
        }
        let key = key.to_string();
        self.submit("contains", move |map| Ok(map.contains_key(&key)))
    }

    fn remove(&self, key: &str) -> Completion<()> {
        if let Some(rejected) = rejected(key) {
            return rejected;
        }
        let key = key.to_string();
        self.submit("remove", move |map| {
            map.remove(&key);
            Ok(())
        })
    }

    fn get_and_remove(&self, key: &str) -> Completion<Option<V>> {
        if let Some(rejected) = rejected(key) {
            return rejected;
        }
        let key = key.to_string();
        self.submit("get_and_remove", move |map| {
            Ok(map.remove(&key).map(|(_, v)| v))
        })
    }

    fn keys(&self) -> Completion<HashSet<String>> {
        self.submit("keys", |map| Ok(key_set(map)))
    }

    fn entries(&self) -> Completion<HashMap<String, V>> {
        self.submit("entries", |map| Ok(snapshot(map)))
    }

    fn size(&self) -> Completion<usize> {
        self.submit("size", |map| Ok(map.len()))
    }
}
