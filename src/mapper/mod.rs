//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了值映射器，以及在任意提供者外层套用映射器的适配器。
//!
//! 映射器在原始值（后端存储的形状）与呈现值（调用方看到的形状）之间转换。
//! 每次越过边界都会调用映射器：写入时 `to_raw`，读取时 `to_presented`。

pub mod json;
pub mod record;
pub mod serialized;

use crate::error::{validate_key, DataError, Result};
use crate::executor::{Completion, Executor};
use crate::provider::{AsyncDataProvider, DataProvider, PreparedWrite, Producer};
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;

pub use json::{EnvelopeMapper, JsonMapper};
pub use record::{KeyValueRecord, KeyedRecord, RecordMapper};
pub use serialized::SerializedMapper;

/// 值映射器
///
/// 映射器只持有不可变配置，可在多个线程间共享。
pub trait ValueMapper<R, P>: Send + Sync + 'static {
    /// 呈现值转为原始值
    fn to_raw(&self, key: &str, value: &P) -> Result<R>;

    /// 原始值转为呈现值
    fn to_presented(&self, key: &str, raw: R) -> Result<P>;
}

/// 部分成功的批量读取结果
///
/// 一个条目转换失败不会丢弃其他条目。
#[derive(Debug)]
pub struct PartialEntries<P> {
    pub values: HashMap<String, P>,
    pub failures: HashMap<String, DataError>,
}

impl<P> PartialEntries<P> {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// 映射适配器
///
/// 把 `AsyncDataProvider<R>` 呈现为 `AsyncDataProvider<P>`，与内层提供者共享执行上下文。
pub struct MappedProvider<M, I, R, P> {
    mapper: Arc<M>,
    inner: I,
    _marker: PhantomData<fn(R) -> P>,
}

impl<M, I, R, P> MappedProvider<M, I, R, P>
where
    M: ValueMapper<R, P>,
    R: Send + 'static,
    P: Send + 'static,
{
    /// 在内层提供者外套用映射器
    pub fn new(inner: I, mapper: M) -> Self {
        Self {
            mapper: Arc::new(mapper),
            inner,
            _marker: PhantomData,
        }
    }

    pub fn mapper(&self) -> &M {
        &self.mapper
    }

    pub fn inner(&self) -> &I {
        &self.inner
    }
}

fn present_all<M, R, P>(mapper: &M, raw: HashMap<String, R>) -> Result<HashMap<String, P>>
where
    M: ValueMapper<R, P>,
{
    raw.into_iter()
        .map(|(key, value)| {
            let presented = mapper.to_presented(&key, value)?;
            Ok((key, presented))
        })
        .collect()
}

fn raw_all<M, R, P>(mapper: &M, entries: &HashMap<String, P>) -> Result<HashMap<String, R>>
where
    M: ValueMapper<R, P>,
{
    entries
        .iter()
        .map(|(key, value)| Ok((key.clone(), mapper.to_raw(key, value)?)))
        .collect()
}

impl<M, I, R, P> MappedProvider<M, I, R, P>
where
    M: ValueMapper<R, P>,
    I: AsyncDataProvider<R>,
    R: Send + 'static,
    P: Send + 'static,
{
    /// 部分成功的批量读取
    ///
    /// 与 `entries()` 不同，转换失败的条目单独记录，其他条目照常返回。
    pub fn entries_partial(&self) -> Completion<PartialEntries<P>> {
        let mapper = self.mapper.clone();
        self.inner.entries().map(move |raw| {
            let mut values = HashMap::with_capacity(raw.len());
            let mut failures = HashMap::new();
            for (key, value) in raw {
                match mapper.to_presented(&key, value) {
                    Ok(presented) => {
                        values.insert(key, presented);
                    }
                    Err(e) => {
                        warn!("Skipping unconvertible entry '{}': {}", key, e);
                        failures.insert(key, e);
                    }
                }
            }
            Ok(PartialEntries { values, failures })
        })
    }
}

impl<M, I, R, P> AsyncDataProvider<P> for MappedProvider<M, I, R, P>
where
    M: ValueMapper<R, P>,
    I: AsyncDataProvider<R>,
    R: Send + 'static,
    P: Send + 'static,
{
    fn executor(&self) -> &Executor {
        self.inner.executor()
    }

    /// 转换在调用方线程完成，转换失败时不提交任何工作
    fn put(&self, key: &str, value: P) -> Completion<()> {
        match self.prepare_put(key, value) {
            Ok(submit) => submit(),
            Err(e) => Completion::ready(Err(e)),
        }
    }

    fn prepare_put<'a>(&'a self, key: &'a str, value: P) -> Result<PreparedWrite<'a>> {
        validate_key(key)?;
        let raw = self.mapper.to_raw(key, &value)?;
        self.inner.prepare_put(key, raw)
    }

    fn prepare_put_all<'a>(&'a self, entries: HashMap<String, P>) -> Result<PreparedWrite<'a>> {
        let raw = raw_all(self.mapper.as_ref(), &entries)?;
        self.inner.prepare_put_all(raw)
    }

    fn put_with(&self, key: &str, producer: Producer<P>) -> Completion<()> {
        let mapper = self.mapper.clone();
        let owned_key = key.to_string();
        self.inner.put_with(
            key,
            Box::new(move || {
                let value = producer()?;
                mapper.to_raw(&owned_key, &value)
            }),
        )
    }

    fn put_all(&self, entries: HashMap<String, P>) -> Completion<()> {
        match self.prepare_put_all(entries) {
            Ok(submit) => submit(),
            Err(e) => Completion::ready(Err(e)),
        }
    }

    fn put_all_with(&self, producer: Producer<HashMap<String, P>>) -> Completion<()> {
        let mapper = self.mapper.clone();
        self.inner.put_all_with(Box::new(move || {
            let entries = producer()?;
            raw_all(mapper.as_ref(), &entries)
        }))
    }

    fn get(&self, key: &str) -> Completion<Option<P>> {
        let mapper = self.mapper.clone();
        let owned_key = key.to_string();
        self.inner.get(key).map(move |raw| {
            raw.map(|raw| mapper.to_presented(&owned_key, raw))
                .transpose()
        })
    }

    fn contains(&self, key: &str) -> Completion<bool> {
        self.inner.contains(key)
    }

    fn remove(&self, key: &str) -> Completion<()> {
        self.inner.remove(key)
    }

    fn get_and_remove(&self, key: &str) -> Completion<Option<P>> {
        let mapper = self.mapper.clone();
        let owned_key = key.to_string();
        self.inner.get_and_remove(key).map(move |raw| {
            raw.map(|raw| mapper.to_presented(&owned_key, raw))
                .transpose()
        })
    }

    fn keys(&self) -> Completion<HashSet<String>> {
        self.inner.keys()
    }

    /// 全有或全无：第一个转换失败的条目使整个批量读取失败
    fn entries(&self) -> Completion<HashMap<String, P>> {
        let mapper = self.mapper.clone();
        self.inner
            .entries()
            .map(move |raw| present_all(mapper.as_ref(), raw))
    }

    fn size(&self) -> Completion<usize> {
        self.inner.size()
    }
}

impl<M, I, R, P> DataProvider<P> for MappedProvider<M, I, R, P>
where
    M: ValueMapper<R, P>,
    I: DataProvider<R>,
    R: Send + 'static,
    P: Send + 'static,
{
    fn put(&self, key: &str, value: P) -> Result<()> {
        let raw = self.mapper.to_raw(key, &value)?;
        self.inner.put(key, raw)
    }

    fn put_all(&self, entries: HashMap<String, P>) -> Result<()> {
        let raw = raw_all(self.mapper.as_ref(), &entries)?;
        self.inner.put_all(raw)
    }

    fn get(&self, key: &str) -> Result<Option<P>> {
        self.inner
            .get(key)?
            .map(|raw| self.mapper.to_presented(key, raw))
            .transpose()
    }

    fn contains(&self, key: &str) -> Result<bool> {
        self.inner.contains(key)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key)
    }

    fn get_and_remove(&self, key: &str) -> Result<Option<P>> {
        self.inner
            .get_and_remove(key)?
            .map(|raw| self.mapper.to_presented(key, raw))
            .transpose()
    }

    fn keys(&self) -> Result<HashSet<String>> {
        self.inner.keys()
    }

    fn entries(&self) -> Result<HashMap<String, P>> {
        present_all(self.mapper.as_ref(), self.inner.entries()?)
    }

    fn size(&self) -> Result<usize> {
        self.inner.size()
    }
}
