//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了以记录为值的关系数据库提供者。
//!
//! 每条记录占一行：`_Key`、`_Value` 与由存储维护的 `_Version`。写入只取记录的值，
//! 键以请求的键为准；读取时由调用方提供的工厂从行重建记录。

use super::sql::{
    connect_database, open_table, validate_identifier, SqlInner, KEY_COLUMN, VALUE_COLUMN,
    VERSION_COLUMN,
};
use crate::error::Result;
use crate::executor::{Completion, Executor};
use crate::mapper::{KeyValueRecord, KeyedRecord};
use crate::provider::{rejected, AsyncDataProvider, Producer};
use sea_orm::{ConnectionTrait, DatabaseConnection, QueryResult, TransactionTrait};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// 从表中读出的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRow {
    pub key: String,
    pub value: String,
    /// 新写入的行为 1，每次覆盖写入加一
    pub version: u64,
}

impl RecordRow {
    fn from_query(key: String, row: &QueryResult) -> Result<Self> {
        let version = row.try_get::<i64>("", VERSION_COLUMN)?;
        Ok(Self {
            key,
            value: row
                .try_get::<Option<String>>("", VALUE_COLUMN)?
                .unwrap_or_default(),
            version: version.max(0) as u64,
        })
    }
}

impl From<RecordRow> for KeyValueRecord {
    fn from(row: RecordRow) -> Self {
        Self {
            key: row.key,
            value: row.value,
            version: row.version,
        }
    }
}

/// 从行重建记录的工厂
pub type RecordFactory<R> = Arc<dyn Fn(RecordRow) -> R + Send + Sync>;

/// 记录型 SQL 数据提供者
///
/// 与 [`SqlDataProvider`](super::SqlDataProvider) 使用相同的表名校验与参数绑定，
/// 批量写入在同一个事务中完成。
pub struct SqlRecordProvider<R> {
    inner: Arc<SqlInner>,
    factory: RecordFactory<R>,
    executor: Executor,
}

impl SqlRecordProvider<KeyValueRecord> {
    /// 以 [`KeyValueRecord`] 为记录类型连接数据库
    pub async fn connect_key_value(
        connection_string: &str,
        table: &str,
        connect_timeout: Duration,
    ) -> Result<Self> {
        Self::connect(connection_string, table, connect_timeout, KeyValueRecord::from).await
    }
}

impl<R: KeyedRecord> SqlRecordProvider<R> {
    /// 连接数据库并确保记录表存在
    ///
    /// # 参数
    ///
    /// * `connection_string` - 数据库连接字符串
    /// * `table` - 表名
    /// * `connect_timeout` - 连接超时
    /// * `factory` - 从行重建记录
    #[instrument(skip(connection_string, factory), level = "info", name = "init_record_provider")]
    pub async fn connect<F>(
        connection_string: &str,
        table: &str,
        connect_timeout: Duration,
        factory: F,
    ) -> Result<Self>
    where
        F: Fn(RecordRow) -> R + Send + Sync + 'static,
    {
        validate_identifier(table)?;
        let connection = connect_database(connection_string, connect_timeout).await?;
        Self::with_connection(connection, table, factory).await
    }

    /// 使用已有连接创建提供者并确保记录表存在
    pub async fn with_connection<F>(
        connection: DatabaseConnection,
        table: &str,
        factory: F,
    ) -> Result<Self>
    where
        F: Fn(RecordRow) -> R + Send + Sync + 'static,
    {
        let (inner, executor) = open_table(connection, table, true).await?;
        Ok(Self {
            inner,
            factory: Arc::new(factory),
            executor,
        })
    }

    pub fn table(&self) -> &str {
        &self.inner.table
    }

    fn submit<T, F, Fut>(&self, operation: &'static str, work: F) -> Completion<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<SqlInner>, RecordFactory<R>) -> Fut,
        Fut: std::future::Future<Output = Result<T>> + Send + 'static,
    {
        self.executor
            .submit(operation, work(self.inner.clone(), self.factory.clone()))
    }
}

async fn select_record<C, R>(
    inner: &SqlInner,
    conn: &C,
    factory: &RecordFactory<R>,
    key: &str,
) -> Result<Option<R>>
where
    C: ConnectionTrait,
{
    match inner.select_row(conn, key).await? {
        Some(row) => Ok(Some(factory(RecordRow::from_query(key.to_string(), &row)?))),
        None => Ok(None),
    }
}

impl<R: KeyedRecord> AsyncDataProvider<R> for SqlRecordProvider<R> {
    fn executor(&self) -> &Executor {
        &self.executor
    }

    /// 记录的键不参与存储，行的键以 `key` 为准
    #[instrument(skip(self, producer), level = "debug", fields(table = %self.inner.table))]
    fn put_with(&self, key: &str, producer: Producer<R>) -> Completion<()> {
        if let Some(rejected) = rejected(key) {
            return rejected;
        }
        let key = key.to_string();
        self.submit("put", move |inner, _| async move {
            let record = producer()?;
            inner
                .upsert(&inner.connection, &key, record.value().to_string())
                .await
        })
    }

    #[instrument(skip(self, producer), level = "debug", fields(table = %self.inner.table))]
    fn put_all_with(&self, producer: Producer<HashMap<String, R>>) -> Completion<()> {
        self.submit("put_all", move |inner, _| async move {
            let records = producer()?;
            if records.is_empty() {
                return Ok(());
            }
            let txn = inner.connection.begin().await?;
            for (key, record) in records {
                inner.upsert(&txn, &key, record.value().to_string()).await?;
            }
            txn.commit().await?;
            Ok(())
        })
    }

    fn get(&self, key: &str) -> Completion<Option<R>> {
        if let Some(rejected) = rejected(key) {
            return rejected;
        }
        let key = key.to_string();
        self.submit("get", move |inner, factory| async move {
            select_record(&inner, &inner.connection, &factory, &key).await
        })
    }

    fn contains(&self, key: &str) -> Completion<bool> {
        if let Some(rejected) = rejected(key) {
            return rejected;
        }
        let key = key.to_string();
        self.submit("contains", move |inner, _| async move {
            Ok(inner.count(&inner.dialect.count_one, vec![key.into()]).await? > 0)
        })
    }

    fn remove(&self, key: &str) -> Completion<()> {
        if let Some(rejected) = rejected(key) {
            return rejected;
        }
        let key = key.to_string();
        self.submit("remove", move |inner, _| async move {
            inner.delete(&inner.connection, &key).await
        })
    }

    fn get_and_remove(&self, key: &str) -> Completion<Option<R>> {
        if let Some(rejected) = rejected(key) {
            return rejected;
        }
        let key = key.to_string();
        self.submit("get_and_remove", move |inner, factory| async move {
            let txn = inner.connection.begin().await?;
            let record = select_record(&inner, &txn, &factory, &key).await?;
            if record.is_some() {
                inner.delete(&txn, &key).await?;
            }
            txn.commit().await?;
            Ok(record)
        })
    }

    fn keys(&self) -> Completion<HashSet<String>> {
        self.submit("keys", |inner, _| async move {
            let rows = inner
                .connection
                .query_all(
                    inner
                        .dialect
                        .statement(&inner.dialect.select_keys, Vec::new()),
                )
                .await?;
            let mut keys = HashSet::with_capacity(rows.len());
            for row in rows {
                keys.insert(row.try_get::<String>("", KEY_COLUMN)?);
            }
            Ok(keys)
        })
    }

    fn entries(&self) -> Completion<HashMap<String, R>> {
        self.submit("entries", |inner, factory| async move {
            let rows = inner
                .connection
                .query_all(
                    inner
                        .dialect
                        .statement(&inner.dialect.select_all, Vec::new()),
                )
                .await?;
            let mut records = HashMap::with_capacity(rows.len());
            for row in rows {
                let key = row.try_get::<String>("", KEY_COLUMN)?;
                let row = RecordRow::from_query(key.clone(), &row)?;
                records.insert(key, factory(row));
            }
            Ok(records)
        })
    }

    fn size(&self) -> Completion<usize> {
        self.submit("size", |inner, _| async move {
            Ok(inner.count(&inner.dialect.count_all, Vec::new()).await?.max(0) as usize)
        })
    }
}
