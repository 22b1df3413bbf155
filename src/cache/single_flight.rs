//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了按键合并并发加载的单飞表。
//!
//! 每个键至多登记一个进行中的加载。登记、完成与被写入取代都在同一个
//! `DashMap` 条目锁下进行，所以加载只会在仍是该键的登记加载时回填缓存。

use crate::error::DataError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 所有等待者共享的加载结果
pub(crate) type LoadResult<V> = std::result::Result<Option<V>, Arc<DataError>>;

/// 可被多个等待者克隆的加载 future
pub(crate) type SharedLoad<V> = Shared<BoxFuture<'static, LoadResult<V>>>;

struct InFlight<V: Clone> {
    id: u64,
    load: SharedLoad<V>,
}

/// 加入或发起加载的结果
pub(crate) enum Joined<V: Clone> {
    /// 拿锁后发现缓存已有结果
    Resolved(Option<V>),
    /// 等待进行中的加载；`started` 表示是否由本次调用发起
    Waiting { load: SharedLoad<V>, started: bool },
}

pub(crate) struct SingleFlight<V: Clone> {
    pending: DashMap<String, InFlight<V>>,
    next_id: AtomicU64,
}

impl<V> SingleFlight<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            pending: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// 加入该键的进行中加载，没有则发起一个
    ///
    /// `lookup` 在条目锁下重新检查缓存；`start` 在条目锁下被调用，参数是新加载的编号。
    pub(crate) fn join_or_start<L, S>(&self, key: &str, lookup: L, start: S) -> Joined<V>
    where
        L: FnOnce() -> Option<Option<V>>,
        S: FnOnce(u64) -> SharedLoad<V>,
    {
        match self.pending.entry(key.to_string()) {
            Entry::Occupied(entry) => Joined::Waiting {
                load: entry.get().load.clone(),
                started: false,
            },
            Entry::Vacant(entry) => {
                if let Some(slot) = lookup() {
                    return Joined::Resolved(slot);
                }
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let load = start(id);
                entry.insert(InFlight {
                    id,
                    load: load.clone(),
                });
                Joined::Waiting {
                    load,
                    started: true,
                }
            }
        }
    }

    /// 在条目锁下执行一次写入，并取消进行中加载回填缓存的资格
    pub(crate) fn supersede<T>(&self, key: &str, write: impl FnOnce() -> T) -> T {
        match self.pending.entry(key.to_string()) {
            Entry::Occupied(entry) => {
                let result = write();
                entry.remove();
                result
            }
            Entry::Vacant(entry) => {
                let result = write();
                drop(entry);
                result
            }
        }
    }

    /// 在条目锁下执行，不改变进行中加载的登记
    pub(crate) fn locked<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let _entry = self.pending.entry(key.to_string());
        f()
    }

    /// 加载成功：若仍是登记的加载，则在条目锁下回填并注销
    ///
    /// 返回是否回填。
    pub(crate) fn complete(&self, key: &str, id: u64, populate: impl FnOnce()) -> bool {
        match self.pending.entry(key.to_string()) {
            Entry::Occupied(entry) if entry.get().id == id => {
                populate();
                entry.remove();
                true
            }
            _ => false,
        }
    }

    /// 加载失败：注销但不回填
    pub(crate) fn abandon(&self, key: &str, id: u64) {
        self.pending.remove_if(key, |_, in_flight| in_flight.id == id);
    }

    /// 取消所有进行中加载的回填资格
    pub(crate) fn clear(&self) {
        self.pending.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}
