//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存装饰器与后端的配置结构和解析逻辑。

use crate::error::{DataError, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_VERSION: u32 = 1;

/// 默认的 Redis 键前缀
pub const DEFAULT_KEY_PREFIX: &str = "data-api:";

/// 默认的 SQL 表名
pub const DEFAULT_TABLE: &str = "data_api";

/// 默认的加载超时（毫秒）
pub const DEFAULT_LOAD_TIMEOUT_MS: u64 = 10_000;

/// 顶层配置
///
/// 对应一个 TOML 配置文件：一个缓存配置加一个后端配置
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub config_version: Option<u32>,
    #[serde(default)]
    pub cache: CacheConfig,
    pub backend: BackendConfig,
}

/// 缓存装饰器配置
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// 最大条目数，`None` 表示不限制
    pub max_entries: Option<u64>,
    /// 写入后存活时间（秒）
    pub time_to_live_secs: Option<u64>,
    /// 最后访问后存活时间（秒）
    pub time_to_idle_secs: Option<u64>,
    /// 单次加载超时（毫秒）
    pub load_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: None,
            time_to_live_secs: None,
            time_to_idle_secs: None,
            load_timeout_ms: DEFAULT_LOAD_TIMEOUT_MS,
        }
    }
}

impl CacheConfig {
    pub fn with_max_entries(mut self, max_entries: u64) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    pub fn with_time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live_secs = Some(ttl.as_secs());
        self
    }

    pub fn with_time_to_idle(mut self, tti: Duration) -> Self {
        self.time_to_idle_secs = Some(tti.as_secs());
        self
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn time_to_live(&self) -> Option<Duration> {
        self.time_to_live_secs.map(Duration::from_secs)
    }

    pub fn time_to_idle(&self) -> Option<Duration> {
        self.time_to_idle_secs.map(Duration::from_secs)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    /// 验证缓存配置
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_entries == Some(0) {
            return Err("Cache max_entries cannot be zero".to_string());
        }
        if self.time_to_live_secs == Some(0) {
            return Err("Cache time_to_live_secs cannot be zero".to_string());
        }
        if self.time_to_idle_secs == Some(0) {
            return Err("Cache time_to_idle_secs cannot be zero".to_string());
        }
        if self.load_timeout_ms == 0 {
            return Err("Cache load_timeout_ms cannot be zero".to_string());
        }
        if self.load_timeout_ms > 3_600_000 {
            return Err("Cache load_timeout_ms cannot exceed 1 hour".to_string());
        }
        Ok(())
    }
}

/// 后端配置
///
/// 在构造时选择具体的存储引擎
#[derive(Deserialize, Clone, Debug)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// 进程内映射
    Memory,
    /// 每个键一个文件
    File {
        /// 数据目录
        directory: PathBuf,
    },
    /// 关系数据库中的一张键值表
    Sql(SqlConfig),
    /// 远程 Redis
    Redis(RedisConfig),
}

impl BackendConfig {
    /// 后端类型名称
    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::Memory => "memory",
            BackendConfig::File { .. } => "file",
            BackendConfig::Sql(_) => "sql",
            BackendConfig::Redis(_) => "redis",
        }
    }
}

/// SQL 后端配置
#[derive(Deserialize, Clone, Debug)]
pub struct SqlConfig {
    /// 连接字符串（sqlite:/mysql:/postgres:）
    pub connection_string: SecretString,
    /// 表名
    #[serde(default = "default_table")]
    pub table: String,
    /// 连接超时（毫秒）
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
}

/// Redis 后端配置
#[derive(Deserialize, Clone, Debug)]
pub struct RedisConfig {
    /// Redis 连接字符串
    pub connection_string: SecretString,
    /// 键前缀
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// 连接超时（毫秒）
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            connection_string: SecretString::new("redis://127.0.0.1:6379".to_string().into()),
            key_prefix: default_key_prefix(),
            connection_timeout_ms: default_connection_timeout_ms(),
        }
    }
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

fn default_connection_timeout_ms() -> u64 {
    5000
}

impl Config {
    /// 从 TOML 文本解析并验证
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| DataError::Configuration(e.to_string()))?;
        config.validate().map_err(DataError::Configuration)?;
        Ok(config)
    }

    /// 从 TOML 文件加载并验证
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DataError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// 验证配置
    ///
    /// 检查配置版本、缓存参数和后端参数是否在合理范围内
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(version) = &self.config_version {
            if *version > CONFIG_VERSION {
                return Err(format!(
                    "Configuration version {} is not supported. Current version is {}.",
                    version, CONFIG_VERSION
                ));
            }
        }

        self.cache.validate()?;

        match &self.backend {
            BackendConfig::Memory => {}
            BackendConfig::File { directory } => {
                if directory.as_os_str().is_empty() {
                    return Err("File backend directory cannot be empty".to_string());
                }
            }
            BackendConfig::Sql(sql) => {
                if sql.table.is_empty() {
                    return Err("SQL backend table cannot be empty".to_string());
                }
                if sql.connection_timeout_ms == 0 {
                    return Err("SQL backend connection_timeout_ms cannot be zero".to_string());
                }
            }
            BackendConfig::Redis(redis) => {
                if redis.key_prefix.is_empty() {
                    return Err("Redis backend key_prefix cannot be empty".to_string());
                }
                if redis.connection_timeout_ms == 0 {
                    return Err("Redis backend connection_timeout_ms cannot be zero".to_string());
                }
            }
        }

        Ok(())
    }
}
