//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于关系数据库键值表的数据提供者。
//!
//! 表结构为 `_Key VARCHAR(255) PRIMARY KEY, _Value TEXT`，记录表另有 `_Version` 列。
//! 所有语句（包括批量写入）都使用参数绑定，表名在构造时校验为安全标识符。

use crate::error::{validate_key, DataError, Result};
use crate::executor::{Completion, Executor};
use crate::provider::{rejected, AsyncDataProvider, Producer};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, QueryResult,
    Statement, TransactionTrait, Value,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

pub(super) const KEY_COLUMN: &str = "_Key";
pub(super) const VALUE_COLUMN: &str = "_Value";
pub(super) const VERSION_COLUMN: &str = "_Version";
const COUNT_COLUMN: &str = "cnt";

const RESERVED_KEYWORDS: &[&str] = &[
    "SELECT", "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TABLE", "INDEX", "WHERE",
    "FROM", "JOIN", "UNION", "OR", "AND", "NOT", "NULL", "TRUE", "FALSE", "IS", "IN", "LIKE",
    "BETWEEN", "ORDER", "BY", "GROUP", "HAVING", "LIMIT", "OFFSET", "DISTINCT", "VIEW",
    "TRIGGER", "PRAGMA", "KEY", "VALUES",
];

/// 校验表名是否为安全的SQL标识符
///
/// 只允许字母、数字和下划线，以字母或下划线开头，长度不超过 64，且不是保留关键字。
pub fn validate_identifier(identifier: &str) -> Result<()> {
    if identifier.is_empty() {
        return Err(DataError::Configuration(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if identifier.len() > 64 {
        return Err(DataError::Configuration(
            "Identifier exceeds maximum length of 64 characters".to_string(),
        ));
    }

    let mut chars = identifier.chars();
    let starts_well = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if !starts_well || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DataError::Configuration(format!(
            "Invalid identifier '{}': only alphanumeric characters and underscores are allowed",
            identifier
        )));
    }

    if RESERVED_KEYWORDS.contains(&identifier.to_uppercase().as_str()) {
        return Err(DataError::Configuration(format!(
            "Invalid identifier '{}': reserved keyword",
            identifier
        )));
    }

    Ok(())
}

/// 针对某个数据库方言预先拼好的语句
///
/// 带版本的表在每次覆盖写入时把 `_Version` 加一，新行从 1 开始。
#[derive(Debug)]
pub(super) struct Dialect {
    pub(super) backend: DatabaseBackend,
    create: String,
    upsert: String,
    select_one: String,
    pub(super) count_one: String,
    delete_one: String,
    pub(super) select_keys: String,
    pub(super) select_all: String,
    pub(super) count_all: String,
}

impl Dialect {
    fn new(backend: DatabaseBackend, table: &str, versioned: bool) -> Self {
        let quote = |ident: &str| match backend {
            DatabaseBackend::MySql => format!("`{}`", ident),
            _ => format!("\"{}\"", ident),
        };
        let (p1, p2) = match backend {
            DatabaseBackend::Postgres => ("$1", "$2"),
            _ => ("?", "?"),
        };
        let t = quote(table);
        let k = quote(KEY_COLUMN);
        let v = quote(VALUE_COLUMN);
        let ver = quote(VERSION_COLUMN);

        let upsert = match (backend, versioned) {
            (DatabaseBackend::MySql, false) => format!(
                "INSERT INTO {t} ({k}, {v}) VALUES ({p1}, {p2}) ON DUPLICATE KEY UPDATE {v} = VALUES({v})"
            ),
            (DatabaseBackend::MySql, true) => format!(
                "INSERT INTO {t} ({k}, {v}, {ver}) VALUES ({p1}, {p2}, 1) ON DUPLICATE KEY UPDATE {v} = VALUES({v}), {ver} = {ver} + 1"
            ),
            (_, false) => format!(
                "INSERT INTO {t} ({k}, {v}) VALUES ({p1}, {p2}) ON CONFLICT ({k}) DO UPDATE SET {v} = excluded.{v}"
            ),
            (_, true) => format!(
                "INSERT INTO {t} ({k}, {v}, {ver}) VALUES ({p1}, {p2}, 1) ON CONFLICT ({k}) DO UPDATE SET {v} = excluded.{v}, {ver} = {t}.{ver} + 1"
            ),
        };

        let (create, columns) = if versioned {
            (
                format!(
                    "CREATE TABLE IF NOT EXISTS {t} ({k} VARCHAR(255) NOT NULL PRIMARY KEY, {v} TEXT, {ver} BIGINT NOT NULL DEFAULT 1)"
                ),
                format!("{v}, {ver}"),
            )
        } else {
            (
                format!(
                    "CREATE TABLE IF NOT EXISTS {t} ({k} VARCHAR(255) NOT NULL PRIMARY KEY, {v} TEXT)"
                ),
                v.clone(),
            )
        };

        Self {
            backend,
            create,
            upsert,
            select_one: format!("SELECT {columns} FROM {t} WHERE {k} = {p1}"),
            count_one: format!("SELECT COUNT(*) AS {COUNT_COLUMN} FROM {t} WHERE {k} = {p1}"),
            delete_one: format!("DELETE FROM {t} WHERE {k} = {p1}"),
            select_keys: format!("SELECT {k} FROM {t}"),
            select_all: format!("SELECT {k}, {columns} FROM {t}"),
            count_all: format!("SELECT COUNT(*) AS {COUNT_COLUMN} FROM {t}"),
        }
    }

    pub(super) fn statement(&self, sql: &str, values: Vec<Value>) -> Statement {
        Statement::from_sql_and_values(self.backend, sql, values)
    }
}

/// 一张键值表：连接、方言与表名
pub(super) struct SqlInner {
    pub(super) connection: DatabaseConnection,
    pub(super) dialect: Dialect,
    pub(super) table: String,
}

impl SqlInner {
    pub(super) async fn upsert<C: ConnectionTrait>(
        &self,
        conn: &C,
        key: &str,
        value: String,
    ) -> Result<()> {
        validate_key(key)?;
        conn.execute(
            self.dialect
                .statement(&self.dialect.upsert, vec![key.into(), value.into()]),
        )
        .await?;
        Ok(())
    }

    pub(super) async fn select_row<C: ConnectionTrait>(
        &self,
        conn: &C,
        key: &str,
    ) -> Result<Option<QueryResult>> {
        Ok(conn
            .query_one(
                self.dialect
                    .statement(&self.dialect.select_one, vec![key.into()]),
            )
            .await?)
    }

    async fn select<C: ConnectionTrait>(&self, conn: &C, key: &str) -> Result<Option<String>> {
        match self.select_row(conn, key).await? {
            Some(row) => Ok(row.try_get::<Option<String>>("", VALUE_COLUMN)?),
            None => Ok(None),
        }
    }

    pub(super) async fn delete<C: ConnectionTrait>(&self, conn: &C, key: &str) -> Result<()> {
        conn.execute(
            self.dialect
                .statement(&self.dialect.delete_one, vec![key.into()]),
        )
        .await?;
        Ok(())
    }

    pub(super) async fn count(&self, sql: &str, values: Vec<Value>) -> Result<i64> {
        let row = self
            .connection
            .query_one(self.dialect.statement(sql, values))
            .await?;
        row.map(|row| count_of(&row)).unwrap_or(Ok(0))
    }
}

fn count_of(row: &QueryResult) -> Result<i64> {
    Ok(row.try_get::<i64>("", COUNT_COLUMN)?)
}

/// 连接数据库
pub(super) async fn connect_database(
    connection_string: &str,
    connect_timeout: Duration,
) -> Result<DatabaseConnection> {
    let mut opt = ConnectOptions::new(connection_string.to_string());
    opt.connect_timeout(connect_timeout).sqlx_logging(false);
    if connection_string.starts_with("sqlite:") {
        // 内存库每个连接都是独立的数据库
        opt.max_connections(1).min_connections(1);
    }
    Ok(Database::connect(opt).await?)
}

/// 校验表名、准备方言并建表
///
/// 建表是执行上下文的第一个工作单元，之后的操作都排在它后面。
pub(super) async fn open_table(
    connection: DatabaseConnection,
    table: &str,
    versioned: bool,
) -> Result<(Arc<SqlInner>, Executor)> {
    validate_identifier(table)?;

    let dialect = Dialect::new(connection.get_database_backend(), table, versioned);
    debug!(
        "SQL table {} using {:?} dialect (versioned={})",
        table, dialect.backend, versioned
    );

    let inner = Arc::new(SqlInner {
        connection,
        dialect,
        table: table.to_string(),
    });
    let executor = Executor::new(format!("sql:{}", table));

    let creating = inner.clone();
    executor
        .submit("create_table", async move {
            creating
                .connection
                .execute(Statement::from_string(
                    creating.dialect.backend,
                    creating.dialect.create.clone(),
                ))
                .await?;
            Ok(())
        })
        .await?;

    Ok((inner, executor))
}

/// SQL 数据提供者
///
/// 支持 SQLite、MySQL 和 PostgreSQL，方言由连接自动识别。
pub struct SqlDataProvider {
    inner: Arc<SqlInner>,
    executor: Executor,
}

impl SqlDataProvider {
    /// 连接数据库并确保表存在
    ///
    /// # 参数
    ///
    /// * `connection_string` - 数据库连接字符串
    /// * `table` - 表名
    /// * `connect_timeout` - 连接超时
    ///
    /// # 返回值
    ///
    /// 返回新的提供者或错误
    #[instrument(skip(connection_string), level = "info", name = "init_sql_provider")]
    pub async fn connect(
        connection_string: &str,
        table: &str,
        connect_timeout: Duration,
    ) -> Result<Self> {
        validate_identifier(table)?;
        let connection = connect_database(connection_string, connect_timeout).await?;
        Self::with_connection(connection, table).await
    }

    /// 使用已有连接创建提供者并确保表存在
    pub async fn with_connection(connection: DatabaseConnection, table: &str) -> Result<Self> {
        let (inner, executor) = open_table(connection, table, false).await?;
        Ok(Self { inner, executor })
    }

    /// 表名
    pub fn table(&self) -> &str {
        &self.inner.table
    }

    /// 底层连接
    pub fn connection(&self) -> &DatabaseConnection {
        &self.inner.connection
    }

    fn submit<T, F, Fut>(&self, operation: &'static str, work: F) -> Completion<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<SqlInner>) -> Fut,
        Fut: std::future::Future<Output = Result<T>> + Send + 'static,
    {
        self.executor.submit(operation, work(self.inner.clone()))
    }
}

impl AsyncDataProvider<String> for SqlDataProvider {
    fn executor(&self) -> &Executor {
        &self.executor
    }

    #[instrument(skip(self, producer), level = "debug", fields(table = %self.inner.table))]
    fn put_with(&self, key: &str, producer: Producer<String>) -> Completion<()> {
        if let Some(rejected) = rejected(key) {
            return rejected;
        }
        let key = key.to_string();
        self.submit("put", move |inner| async move {
            let value = producer()?;
            inner.upsert(&inner.connection, &key, value).await
        })
    }

    #[instrument(skip(self, producer), level = "debug", fields(table = %self.inner.table))]
    fn put_all_with(&self, producer: Producer<HashMap<String, String>>) -> Completion<()> {
        self.submit("put_all", move |inner| async move {
            let entries = producer()?;
            if entries.is_empty() {
                return Ok(());
            }
            let txn = inner.connection.begin().await?;
            for (key, value) in entries {
                inner.upsert(&txn, &key, value).await?;
            }
            txn.commit().await?;
            Ok(())
        })
    }

    #[instrument(skip(self), level = "debug", fields(table = %self.inner.table))]
    fn get(&self, key: &str) -> Completion<Option<String>> {
        if let Some(rejected) = rejected(key) {
            return rejected;
        }
        let key = key.to_string();
        self.submit("get", move |inner| async move {
            inner.select(&inner.connection, &key).await
        })
    }

    fn contains(&self, key: &str) -> Completion<bool> {
        if let Some(rejected) = rejected(key) {
            return rejected;
        }
        let key = key.to_string();
        self.submit("contains", move |inner| async move {
            Ok(inner.count(&inner.dialect.count_one, vec![key.into()]).await? > 0)
        })
    }

    fn remove(&self, key: &str) -> Completion<()> {
        if let Some(rejected) = rejected(key) {
            return rejected;
        }
        let key = key.to_string();
        self.submit("remove", move |inner| async move {
            inner.delete(&inner.connection, &key).await
        })
    }

    fn get_and_remove(&self, key: &str) -> Completion<Option<String>> {
        if let Some(rejected) = rejected(key) {
            return rejected;
        }
        let key = key.to_string();
        self.submit("get_and_remove", move |inner| async move {
            let txn = inner.connection.begin().await?;
            let value = inner.select(&txn, &key).await?;
            if value.is_some() {
                inner.delete(&txn, &key).await?;
            }
            txn.commit().await?;
            Ok(value)
        })
    }

    fn keys(&self) -> Completion<HashSet<String>> {
        self.submit("keys", |inner| async move {
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

    fn entries(&self) -> Completion<HashMap<String, String>> {
        self.submit("entries", |inner| async move {
            let rows = inner
                .connection
                .query_all(
                    inner
                        .dialect
                        .statement(&inner.dialect.select_all, Vec::new()),
                )
                .await?;
            let mut entries = HashMap::with_capacity(rows.len());
            for row in rows {
                let key = row.try_get::<String>("", KEY_COLUMN)?;
                if let Some(value) = row.try_get::<Option<String>>("", VALUE_COLUMN)? {
                    entries.insert(key, value);
                }
            }
            Ok(entries)
        })
    }

    fn size(&self) -> Completion<usize> {
        self.submit("size", |inner| async move {
            Ok(inner.count(&inner.dialect.count_all, Vec::new()).await?.max(0) as usize)
        })
    }
}
