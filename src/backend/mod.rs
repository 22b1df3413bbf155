//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了各存储引擎的后端适配器，以及按配置构造后端的入口。

pub mod file;
pub mod record;
pub mod redis;
pub mod sql;

use crate::config::BackendConfig;
use crate::error::Result;
use crate::provider::{AsyncDataProvider, MemoryProvider};
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

pub use self::file::FileDataProvider;
pub use self::record::{RecordRow, SqlRecordProvider};
pub use self::redis::RedisDataProvider;
pub use self::sql::SqlDataProvider;

/// 按配置构造后端
///
/// # 参数
///
/// * `config` - 后端配置
///
/// # 返回值
///
/// 返回以字符串为值的异步提供者
#[instrument(skip(config), level = "info", fields(kind = config.kind()))]
pub async fn open(config: &BackendConfig) -> Result<Arc<dyn AsyncDataProvider<String>>> {
    let provider: Arc<dyn AsyncDataProvider<String>> = match config {
        BackendConfig::Memory => Arc::new(MemoryProvider::<String>::new()),
        BackendConfig::File { directory } => Arc::new(FileDataProvider::new(directory)?),
        BackendConfig::Sql(sql) => Arc::new(
            SqlDataProvider::connect(
                sql.connection_string.expose_secret(),
                &sql.table,
                Duration::from_millis(sql.connection_timeout_ms),
            )
            .await?,
        ),
        BackendConfig::Redis(redis) => Arc::new(RedisDataProvider::connect(redis).await?),
    };
    info!("Opened {} backend", config.kind());
    Ok(provider)
}
