//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了字节型值映射器使用的编解码器。
//!
//! [`SerializedMapper`](crate::mapper::SerializedMapper) 写入时把呈现值编码成字节交给
//! 后端，读取时再解码。编解码器只报告 `Serialization` 错误，由映射器补上出错的键。

pub mod json;

use crate::error::Result;
use serde::{de::DeserializeOwned, Serialize};

pub use json::JsonSerializer;

/// 字节编解码器
pub trait Serializer: Send + Sync {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T>;

    /// 格式名称，出现在转换错误与日志中
    fn format(&self) -> &'static str;
}

/// 映射器持有的编解码器
///
/// `Serializer` 含泛型方法无法做成 trait object，用枚举做静态分发
#[derive(Clone, Debug)]
pub enum SerializerEnum {
    Json(JsonSerializer),
}

impl SerializerEnum {
    pub fn json() -> Self {
        SerializerEnum::Json(JsonSerializer::new())
    }

    /// gzip 压缩的 JSON，适合体积较大的值
    pub fn gzip_json() -> Self {
        SerializerEnum::Json(JsonSerializer::with_compression())
    }
}

impl Default for SerializerEnum {
    fn default() -> Self {
        Self::json()
    }
}

impl Serializer for SerializerEnum {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            SerializerEnum::Json(s) => s.serialize(value),
        }
    }

    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        match self {
            SerializerEnum::Json(s) => s.deserialize(data),
        }
    }

    fn format(&self) -> &'static str {
        match self {
            SerializerEnum::Json(s) => s.format(),
        }
    }
}
