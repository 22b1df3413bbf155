//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了同步与异步两套键值访问契约。
//!
//! 后端、映射器与缓存装饰器都实现这两个 trait，调用方只依赖契约本身。

pub mod memory;

use crate::error::{validate_key, Result};
use crate::executor::{Completion, Executor};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub use memory::MemoryProvider;

/// 延迟值生产者，在提供者的执行上下文中求值
pub type Producer<T> = Box<dyn FnOnce() -> Result<T> + Send + 'static>;

/// 已通过校验与转换、尚未提交的写入；调用时才提交到执行上下文
pub type PreparedWrite<'a> = Box<dyn FnOnce() -> Completion<()> + Send + 'a>;

/// 同步键值访问契约
///
/// 读取不存在的键返回 `Ok(None)`；删除不存在的键是空操作。
pub trait DataProvider<V>: Send + Sync {
    /// 写入（存在则覆盖）
    fn put(&self, key: &str, value: V) -> Result<()>;

    /// 批量写入
    fn put_all(&self, entries: HashMap<String, V>) -> Result<()>;

    /// 读取
    fn get(&self, key: &str) -> Result<Option<V>>;

    /// 是否存在
    fn contains(&self, key: &str) -> Result<bool>;

    /// 删除
    fn remove(&self, key: &str) -> Result<()>;

    /// 删除并返回删除前的值
    fn get_and_remove(&self, key: &str) -> Result<Option<V>>;

    /// 当前所有键
    fn keys(&self) -> Result<HashSet<String>>;

    /// 当前所有条目
    fn entries(&self) -> Result<HashMap<String, V>>;

    /// 条目数量
    fn size(&self) -> Result<usize>;
}

/// 异步键值访问契约
///
/// 每个方法在调用时把工作提交到提供者的执行上下文，返回的 [`Completion`]
/// 在工作完成后解析。同一提供者上提交的工作按提交顺序执行。
pub trait AsyncDataProvider<V: Send + 'static>: Send + Sync {
    /// 提供者的执行上下文
    fn executor(&self) -> &Executor;

    /// 写入（存在则覆盖）
    fn put(&self, key: &str, value: V) -> Completion<()> {
        self.put_with(key, Box::new(move || Ok(value)))
    }

    /// 写入由生产者在执行上下文中产生的值
    ///
    /// 生产者失败时该次写入失败，不影响后续工作。
    fn put_with(&self, key: &str, producer: Producer<V>) -> Completion<()>;

    /// 批量写入
    fn put_all(&self, entries: HashMap<String, V>) -> Completion<()> {
        self.put_all_with(Box::new(move || Ok(entries)))
    }

    /// 批量写入由生产者产生的条目
    fn put_all_with(&self, producer: Producer<HashMap<String, V>>) -> Completion<()>;

    /// 分两步写入：先在调用方线程完成校验与值转换，再由返回的闭包提交
    ///
    /// 准备失败时没有任何工作被提交。
    fn prepare_put<'a>(&'a self, key: &'a str, value: V) -> Result<PreparedWrite<'a>> {
        validate_key(key)?;
        Ok(Box::new(move || self.put(key, value)))
    }

    /// 批量写入的两步形式
    fn prepare_put_all<'a>(&'a self, entries: HashMap<String, V>) -> Result<PreparedWrite<'a>> {
        for key in entries.keys() {
            validate_key(key)?;
        }
        Ok(Box::new(move || self.put_all(entries)))
    }

    /// 读取，不存在时解析为 `None`
    fn get(&self, key: &str) -> Completion<Option<V>>;

    /// 是否存在
    fn contains(&self, key: &str) -> Completion<bool>;

    /// 删除
    fn remove(&self, key: &str) -> Completion<()>;

    /// 删除并解析为删除前的值
    fn get_and_remove(&self, key: &str) -> Completion<Option<V>>;

    /// 当前所有键
    fn keys(&self) -> Completion<HashSet<String>>;

    /// 当前所有条目
    fn entries(&self) -> Completion<HashMap<String, V>>;

    /// 条目数量
    fn size(&self) -> Completion<usize>;
}

/// 校验键，非法时返回一个已失败的完成句柄
pub(crate) fn rejected<T: Send + 'static>(key: &str) -> Option<Completion<T>> {
    validate_key(key).err().map(|e| Completion::ready(Err(e)))
}

impl<V, P> AsyncDataProvider<V> for Arc<P>
where
    V: Send + 'static,
    P: AsyncDataProvider<V> + ?Sized,
{
    fn executor(&self) -> &Executor {
        (**self).executor()
    }

    fn put(&self, key: &str, value: V) -> Completion<()> {
        (**self).put(key, value)
    }

    fn put_with(&self, key: &str, producer: Producer<V>) -> Completion<()> {
        (**self).put_with(key, producer)
    }

    fn put_all(&self, entries: HashMap<String, V>) -> Completion<()> {
        (**self).put_all(entries)
    }

    fn put_all_with(&self, producer: Producer<HashMap<String, V>>) -> Completion<()> {
        (**self).put_all_with(producer)
    }

    fn prepare_put<'a>(&'a self, key: &'a str, value: V) -> Result<PreparedWrite<'a>> {
        (**self).prepare_put(key, value)
    }

    fn prepare_put_all<'a>(&'a self, entries: HashMap<String, V>) -> Result<PreparedWrite<'a>> {
        (**self).prepare_put_all(entries)
    }

    fn get(&self, key: &str) -> Completion<Option<V>> {
        (**self).get(key)
    }

    fn contains(&self, key: &str) -> Completion<bool> {
        (**self).contains(key)
    }

    fn remove(&self, key: &str) -> Completion<()> {
        (**self).remove(key)
    }

    fn get_and_remove(&self, key: &str) -> Completion<Option<V>> {
        (**self).get_and_remove(key)
    }

    fn keys(&self) -> Completion<HashSet<String>> {
        (**self).keys()
    }

    fn entries(&self) -> Completion<HashMap<String, V>> {
        (**self).entries()
    }

    fn size(&self) -> Completion<usize> {
        (**self).size()
    }
}

impl<V, P> DataProvider<V> for Arc<P>
where
    P: DataProvider<V> + ?Sized,
{
    fn put(&self, key: &str, value: V) -> Result<()> {
        (**self).put(key, value)
    }

    fn put_all(&self, entries: HashMap<String, V>) -> Result<()> {
        (**self).put_all(entries)
    }

    fn get(&self, key: &str) -> Result<Option<V>> {
        (**self).get(key)
    }

    fn contains(&self, key: &str) -> Result<bool> {
        (**self).contains(key)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }

    fn get_and_remove(&self, key: &str) -> Result<Option<V>> {
        (**self).get_and_remove(key)
    }

    fn keys(&self) -> Result<HashSet<String>> {
        (**self).keys()
    }

    fn entries(&self) -> Result<HashMap<String, V>> {
        (**self).entries()
    }

    fn size(&self) -> Result<usize> {
        (**self).size()
    }
}
