//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了数据访问层的错误类型和处理机制。

use std::sync::Arc;
use thiserror::Error;

/// 数据访问错误类型枚举
///
/// 未找到（not-found）不是错误，由 `Ok(None)` 表示。
#[derive(Error, Debug)]
pub enum DataError {
    /// 非法键（空字符串等）
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// 值转换失败，定位到单个键
    #[error("Conversion failed for key '{key}': {reason}")]
    Conversion { key: String, reason: String },

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 后端错误
    #[error("Backend error: {0}")]
    Backend(String),

    /// IO错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Redis错误
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Sea-ORM数据库错误
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// 超时错误
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// 单飞加载失败，所有等待者共享同一个错误
    #[error("Load failed: {0}")]
    Load(Arc<DataError>),

    /// 延迟值生产者失败
    #[error("Value producer failed: {0}")]
    Producer(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 执行上下文已关闭
    #[error("Shutdown error: {0}")]
    Shutdown(String),
}

impl DataError {
    /// 构造转换错误
    pub fn conversion(key: &str, reason: impl std::fmt::Display) -> Self {
        DataError::Conversion {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    /// 是否为共享的单飞加载错误
    pub fn is_load_failure(&self) -> bool {
        matches!(self, DataError::Load(_))
    }
}

/// 数据访问结果类型别名
pub type Result<T> = std::result::Result<T, DataError>;

/// 校验键是否合法
///
/// 逻辑键空间是扁平字符串，唯一的硬性要求是非空。
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(DataError::InvalidKey("key cannot be empty".to_string()));
    }
    Ok(())
}
