//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了记录型后端使用的映射器：原始值是一条带键的记录。
//!
//! 记录可以存进 [`SqlRecordProvider`](crate::backend::SqlRecordProvider)，
//! 版本号由表维护。

use super::ValueMapper;
use crate::error::{DataError, Result};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

/// 以键和文本值为字段的记录
pub trait KeyedRecord: Send + 'static {
    fn key(&self) -> &str;

    fn value(&self) -> &str;

    /// 存储侧维护的版本号，尚未存储的记录为 0
    fn version(&self) -> u64 {
        0
    }
}

/// 最简单的键值记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValueRecord {
    pub key: String,
    pub value: String,
    /// 存储侧维护的版本号：未存储为 0，首次写入为 1，之后每次覆盖加一
    #[serde(default)]
    pub version: u64,
}

impl KeyValueRecord {
    pub fn new(key: &str, value: String) -> Self {
        Self {
            key: key.to_string(),
            value,
            version: 0,
        }
    }
}

impl KeyedRecord for KeyValueRecord {
    fn key(&self) -> &str {
        &self.key
    }

    fn value(&self) -> &str {
        &self.value
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// 记录映射器
///
/// 写入时用调用方提供的工厂构造记录；读取时取出记录的值，并校验记录的键与请求的键一致。
pub struct RecordMapper<R, F> {
    factory: F,
    _marker: PhantomData<fn() -> R>,
}

impl<R, F> RecordMapper<R, F>
where
    R: KeyedRecord,
    F: Fn(&str, String) -> R + Send + Sync + 'static,
{
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            _marker: PhantomData,
        }
    }
}

impl RecordMapper<KeyValueRecord, fn(&str, String) -> KeyValueRecord> {
    /// 以 [`KeyValueRecord`] 为记录类型
    pub fn key_value() -> Self {
        Self::new(KeyValueRecord::new)
    }
}

impl<R, F> ValueMapper<R, String> for RecordMapper<R, F>
where
    R: KeyedRecord,
    F: Fn(&str, String) -> R + Send + Sync + 'static,
{
    fn to_raw(&self, key: &str, value: &String) -> Result<R> {
        Ok((self.factory)(key, value.clone()))
    }

    fn to_presented(&self, key: &str, raw: R) -> Result<String> {
        if raw.key() != key {
            return Err(DataError::conversion(
                key,
                format!("record belongs to key '{}'", raw.key()),
            ));
        }
        Ok(raw.value().to_string())
    }
}
