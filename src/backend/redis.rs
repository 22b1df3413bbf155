//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于Redis的数据提供者。

use crate::config::RedisConfig;
use crate::error::{DataError, Result};
use crate::executor::{Completion, Executor};
use crate::provider::{rejected, AsyncDataProvider, Producer};
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use secrecy::ExposeSecret;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, instrument};

const SCAN_BATCH: usize = 500;
const MGET_BATCH: usize = 500;

/// 转义 glob 特殊字符，使前缀在 `SCAN MATCH` 中按字面匹配
fn escape_glob(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

struct RedisInner {
    manager: ConnectionManager,
    prefix: String,
}

impl RedisInner {
    fn format_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn extract_key<'a>(&self, raw: &'a str) -> Option<&'a str> {
        raw.strip_prefix(self.prefix.as_str())
            .filter(|key| !key.is_empty())
    }

    async fn scan_keys(&self) -> Result<Vec<String>> {
        let mut conn = self.manager.clone();
        let pattern = format!("{}*", escape_glob(&self.prefix));
        let mut cursor: u64 = 0;
        let mut raw_keys = HashSet::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            raw_keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(raw_keys.into_iter().collect())
    }
}

/// Redis 数据提供者
///
/// 键以配置的前缀（默认 `data-api:`）存储。`get_and_remove` 使用原子的 GET+DEL 管道。
pub struct RedisDataProvider {
    inner: Arc<RedisInner>,
    executor: Executor,
}

impl RedisDataProvider {
    /// 连接 Redis
    ///
    /// # 参数
    ///
    /// * `config` - Redis后端配置
    ///
    /// # 返回值
    ///
    /// 返回新的提供者或错误
    #[instrument(skip(config), level = "info", name = "init_redis_provider", fields(prefix = %config.key_prefix))]
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let connection_string = config.connection_string.expose_secret();
        let client = Client::open(connection_string)?;
        let manager = match timeout(
            Duration::from_millis(config.connection_timeout_ms),
            client.get_connection_manager(),
        )
        .await
        {
            Ok(res) => res?,
            Err(_) => {
                return Err(DataError::Timeout(format!(
                    "Redis connection timed out after {}ms",
                    config.connection_timeout_ms
                )));
            }
        };
        debug!("Redis provider connected");
        Ok(Self::with_manager(manager, &config.key_prefix))
    }

    /// 使用已有连接管理器创建提供者
    pub fn with_manager(manager: ConnectionManager, prefix: &str) -> Self {
        Self {
            inner: Arc::new(RedisInner {
                manager,
                prefix: prefix.to_string(),
            }),
            executor: Executor::new(format!("redis:{}", prefix)),
        }
    }

    /// 键前缀
    pub fn prefix(&self) -> &str {
        &self.inner.prefix
    }

    fn submit<T, F, Fut>(&self, operation: &'static str, work: F) -> Completion<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<RedisInner>, ConnectionManager) -> Fut,
        Fut: std::future::Future<Output = Result<T>> + Send + 'static,
    {
        let conn = self.inner.manager.clone();
        self.executor
            .submit(operation, work(self.inner.clone(), conn))
    }
}

impl AsyncDataProvider<String> for RedisDataProvider {
    fn executor(&self) -> &Executor {
        &self.executor
    }

    #[instrument(skip(self, producer), level = "debug", fields(prefix = %self.inner.prefix))]
    fn put_with(&self, key: &str, producer: Producer<String>) -> Completion<()> {
        if let Some(rejected) = rejected(key) {
            return rejected;
        }
        let key = key.to_string();
        self.submit("put", move |inner, mut conn| async move {
            let value = producer()?;
            conn.set::<_, _, ()>(inner.format_key(&key), value).await?;
            Ok(())
        })
    }

    fn put_all_with(&self, producer: Producer<HashMap<String, String>>) -> Completion<()> {
        self.submit("put_all", move |inner, mut conn| async move {
            let entries = producer()?;
            if entries.is_empty() {
                return Ok(());
            }
            let mut pairs = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                crate::error::validate_key(&key)?;
                pairs.push((inner.format_key(&key), value));
            }
            conn.mset::<_, _, ()>(pairs.as_slice()).await?;
            Ok(())
        })
    }

    #[instrument(skip(self), level = "debug", fields(prefix = %self.inner.prefix))]
    fn get(&self, key: &str) -> Completion<Option<String>> {
        if let Some(rejected) = rejected(key) {
            return rejected;
        }
        let key = key.to_string();
        self.submit("get", move |inner, mut conn| async move {
            Ok(conn.get::<_, Option<String>>(inner.format_key(&key)).await?)
        })
    }

    fn contains(&self, key: &str) -> Completion<bool> {
        if let Some(rejected) = rejected(key) {
            return rejected;
        }
        let key = key.to_string();
        self.submit("contains", move |inner, mut conn| async move {
            Ok(conn.exists::<_, bool>(inner.format_key(&key)).await?)
        })
    }

    fn remove(&self, key: &str) -> Completion<()> {
        if let Some(rejected) = rejected(key) {
            return rejected;
        }
        let key = key.to_string();
        self.submit("remove", move |inner, mut conn| async move {
            conn.del::<_, ()>(inner.format_key(&key)).await?;
            Ok(())
        })
    }

    fn get_and_remove(&self, key: &str) -> Completion<Option<String>> {
        if let Some(rejected) = rejected(key) {
            return rejected;
        }
        let key = key.to_string();
        self.submit("get_and_remove", move |inner, mut conn| async move {
            let raw_key = inner.format_key(&key);
            let (value, _): (Option<String>, i64) = redis::pipe()
                .atomic()
                .get(&raw_key)
                .del(&raw_key)
                .query_async(&mut conn)
                .await?;
            Ok(value)
        })
    }

    fn keys(&self) -> Completion<HashSet<String>> {
        self.submit("keys", |inner, _conn| async move {
            let raw_keys = inner.scan_keys().await?;
            Ok(raw_keys
                .iter()
                .filter_map(|raw| inner.extract_key(raw))
                .map(str::to_string)
                .collect())
        })
    }

    fn entries(&self) -> Completion<HashMap<String, String>> {
        self.submit("entries", |inner, mut conn| async move {
            let raw_keys = inner.scan_keys().await?;
            let mut entries = HashMap::with_capacity(raw_keys.len());
            for chunk in raw_keys.chunks(MGET_BATCH) {
                let values: Vec<Option<String>> = redis::cmd("MGET")
                    .arg(chunk.to_vec())
                    .query_async(&mut conn)
                    .await?;
                for (raw, value) in chunk.iter().zip(values) {
                    // 扫描与读取之间被删除的键跳过
                    if let (Some(key), Some(value)) = (inner.extract_key(raw), value) {
                        entries.insert(key.to_string(), value);
                    }
                }
            }
            Ok(entries)
        })
    }

    fn size(&self) -> Completion<usize> {
        self.submit("size", |inner, _conn| async move {
            Ok(inner
                .scan_keys()
                .await?
                .iter()
                .filter(|raw| inner.extract_key(raw).is_some())
                .count())
        })
    }
}
