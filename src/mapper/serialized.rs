//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了字节型后端使用的序列化映射器。

use super::ValueMapper;
use crate::error::{DataError, Result};
use crate::serialization::{Serializer, SerializerEnum};
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;

/// 序列化映射器：原始值为字节，呈现值为任意 serde 类型
pub struct SerializedMapper<T> {
    serializer: SerializerEnum,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SerializedMapper<T> {
    pub fn new(serializer: SerializerEnum) -> Self {
        Self {
            serializer,
            _marker: PhantomData,
        }
    }

    /// 使用 gzip 压缩的 JSON
    pub fn compressed() -> Self {
        Self::new(SerializerEnum::gzip_json())
    }
}

impl<T> Default for SerializedMapper<T> {
    fn default() -> Self {
        Self::new(SerializerEnum::default())
    }
}

impl<T> ValueMapper<Vec<u8>, T> for SerializedMapper<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    fn to_raw(&self, key: &str, value: &T) -> Result<Vec<u8>> {
        self.serializer.serialize(value).map_err(|e| {
            DataError::conversion(key, format!("{} encode: {}", self.serializer.format(), e))
        })
    }

    fn to_presented(&self, key: &str, raw: Vec<u8>) -> Result<T> {
        self.serializer.deserialize(&raw).map_err(|e| {
            DataError::conversion(key, format!("{} decode: {}", self.serializer.format(), e))
        })
    }
}
