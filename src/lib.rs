//! oxdata - 统一的键值数据访问层
//!
//! 以同一套同步/异步契约访问文件、关系数据库、Redis 与内存映射，
//! 并提供带单飞加载合并的旁路缓存装饰器与值映射器。

#![doc(html_root_url = "https://docs.rs/oxdata/0.1.0")]

pub use serde;
pub use serde::{Deserialize, Serialize};
pub use serde_json;
pub use tokio;

pub mod backend;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod mapper;
pub mod metrics;
pub mod provider;
pub mod serialization;
pub mod telemetry;

// Re-export commonly used items
pub use cache::{CacheStats, CachedDataProvider};
pub use config::{BackendConfig, CacheConfig, Config};
pub use error::{DataError, Result};
pub use executor::{Completion, Executor};
pub use mapper::{MappedProvider, ValueMapper};
pub use provider::{AsyncDataProvider, DataProvider, MemoryProvider, Producer};

/// oxdata 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
