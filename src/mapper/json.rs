//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于 JSON 的值映射器。

use super::ValueMapper;
use crate::error::{DataError, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::marker::PhantomData;

/// JSON 文本映射器：原始值为 JSON 文本，呈现值为任意 serde 类型
pub struct JsonMapper<T> {
    pretty: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonMapper<T> {
    pub fn new() -> Self {
        Self {
            pretty: false,
            _marker: PhantomData,
        }
    }

    /// 写入带缩进的 JSON，便于直接查看文件后端
    pub fn pretty() -> Self {
        Self {
            pretty: true,
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonMapper<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ValueMapper<String, T> for JsonMapper<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    fn to_raw(&self, key: &str, value: &T) -> Result<String> {
        let encoded = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        encoded.map_err(|e| DataError::conversion(key, e))
    }

    fn to_presented(&self, key: &str, raw: String) -> Result<T> {
        serde_json::from_str(&raw).map_err(|e| DataError::conversion(key, e))
    }
}

/// 信封映射器：把字符串包进 `{"value": ...}` 结构化文档
///
/// 用于只能存放结构化文档的后端。
#[derive(Debug, Clone)]
pub struct EnvelopeMapper {
    field: String,
}

impl EnvelopeMapper {
    pub const DEFAULT_FIELD: &'static str = "value";

    pub fn new() -> Self {
        Self::with_field(Self::DEFAULT_FIELD)
    }

    pub fn with_field(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }
}

impl Default for EnvelopeMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueMapper<Value, String> for EnvelopeMapper {
    fn to_raw(&self, _key: &str, value: &String) -> Result<Value> {
        let mut document = Map::new();
        document.insert(self.field.clone(), Value::String(value.clone()));
        Ok(Value::Object(document))
    }

    fn to_presented(&self, key: &str, raw: Value) -> Result<String> {
        match raw {
            Value::Object(mut document) => match document.remove(&self.field) {
                Some(Value::String(s)) => Ok(s),
                Some(other) => Err(DataError::conversion(
                    key,
                    format!("field '{}' is {}, expected a string", self.field, kind(&other)),
                )),
                None => Err(DataError::conversion(
                    key,
                    format!("document has no '{}' field", self.field),
                )),
            },
            other => Err(DataError::conversion(
                key,
                format!("expected an object, found {}", kind(&other)),
            )),
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
