//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了JSON序列化器，可选 gzip 压缩。

use super::Serializer;
use crate::error::{DataError, Result};
use serde::{de::DeserializeOwned, Serialize};

/// JSON序列化器
#[derive(Clone, Debug, Default)]
pub struct JsonSerializer {
    compress: bool,
}

impl JsonSerializer {
    pub fn new() -> Self {
        Self { compress: false }
    }

    /// 输出经过 gzip 压缩的 JSON
    ///
    /// 未启用 `flate2` 特性时压缩请求会在序列化时报错，而不是静默写出未压缩数据。
    pub fn with_compression() -> Self {
        Self { compress: true }
    }

    pub fn is_compressed(&self) -> bool {
        self.compress
    }
}

fn serialization_error(e: impl std::fmt::Display) -> DataError {
    DataError::Serialization(e.to_string())
}

#[cfg(feature = "flate2")]
fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(data).map_err(serialization_error)?;
    encoder.finish().map_err(serialization_error)
}

#[cfg(feature = "flate2")]
fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    use flate2::read::GzDecoder;
    use std::io::Read;

    let mut decoded = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut decoded)
        .map_err(serialization_error)?;
    Ok(decoded)
}

#[cfg(not(feature = "flate2"))]
fn gzip(_data: &[u8]) -> Result<Vec<u8>> {
    Err(serialization_error("gzip support requires the flate2 feature"))
}

#[cfg(not(feature = "flate2"))]
fn gunzip(_data: &[u8]) -> Result<Vec<u8>> {
    Err(serialization_error("gzip support requires the flate2 feature"))
}

impl Serializer for JsonSerializer {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let json_bytes = serde_json::to_vec(value).map_err(serialization_error)?;
        if self.compress {
            gzip(&json_bytes)
        } else {
            Ok(json_bytes)
        }
    }

    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        if self.compress {
            let json_bytes = gunzip(data)?;
            serde_json::from_slice(&json_bytes).map_err(serialization_error)
        } else {
            serde_json::from_slice(data).map_err(serialization_error)
        }
    }

    fn format(&self) -> &'static str {
        if self.compress {
            "json+gzip"
        } else {
            "json"
        }
    }
}
