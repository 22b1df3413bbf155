//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于文件系统的数据提供者，每个键对应目录下的一个文件。
//!
//! 文件名是转义后的键，长度受文件系统限制：转义结果超过 [`MAX_FILE_NAME_LEN`]
//! 字节的键以 `InvalidKey` 拒绝。非字母数字字节转义后占三个字节。

use crate::error::{validate_key, DataError, Result};
use crate::executor::{Completion, Executor};
use crate::provider::{rejected, AsyncDataProvider, DataProvider, Producer};
use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

const TEMP_SUFFIX: &str = ".tmp";

/// 转义后文件名的最大字节数，为临时文件的前后缀留出空间
pub const MAX_FILE_NAME_LEN: usize = 200;

/// 临时文件序号，同一个键的并发写入各用各的临时文件
static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// 把逻辑键转义为扁平的文件名
///
/// `[A-Za-z0-9_-]` 与非首位的 `.` 原样保留，其余字节编码为 `%XX`。
/// 转义结果不会以 `.` 开头，因此不会和隐藏文件或临时文件冲突。
pub fn escape_key(key: &str) -> String {
    let mut escaped = String::with_capacity(key.len());
    for (i, byte) in key.bytes().enumerate() {
        let keep = byte.is_ascii_alphanumeric()
            || byte == b'-'
            || byte == b'_'
            || (byte == b'.' && i > 0);
        if keep {
            escaped.push(byte as char);
        } else {
            escaped.push_str(&format!("%{:02X}", byte));
        }
    }
    escaped
}

/// [`escape_key`] 的逆操作，不是合法转义结果的文件名返回 `None`
pub fn unescape_key(name: &str) -> Option<String> {
    if name.is_empty() || name.starts_with('.') {
        return None;
    }
    let bytes = name.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            decoded.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).ok()
}

/// 文件数据提供者
///
/// 值以 UTF-8 文本保存。写入先落到本次调用独有的隐藏临时文件再原子重命名，
/// 同步与异步写入同一个键时互不覆盖对方的临时文件。
pub struct FileDataProvider {
    directory: Arc<PathBuf>,
    executor: Executor,
}

impl FileDataProvider {
    /// 创建文件提供者，目录不存在时自动创建
    ///
    /// # 参数
    ///
    /// * `directory` - 数据目录
    ///
    /// # 返回值
    ///
    /// 返回新的提供者或IO错误
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;
        if !directory.is_dir() {
            return Err(DataError::Configuration(format!(
                "{} is not a directory",
                directory.display()
            )));
        }
        debug!("File provider opened at {}", directory.display());
        let executor = Executor::new(format!("file:{}", directory.display()));
        Ok(Self {
            directory: Arc::new(directory),
            executor,
        })
    }

    /// 数据目录
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn submit<T, F, Fut>(&self, operation: &'static str, work: F) -> Completion<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<PathBuf>) -> Fut,
        Fut: std::future::Future<Output = Result<T>> + Send + 'static,
    {
        self.executor
            .submit(operation, work(self.directory.clone()))
    }
}

/// 校验键并得到它的文件名
fn file_name_for(key: &str) -> Result<String> {
    validate_key(key)?;
    let name = escape_key(key);
    if name.len() > MAX_FILE_NAME_LEN {
        return Err(DataError::InvalidKey(format!(
            "key escapes to a {}-byte file name, limit is {}",
            name.len(),
            MAX_FILE_NAME_LEN
        )));
    }
    Ok(name)
}

fn rejected_name<T: Send + 'static>(key: &str) -> Option<Completion<T>> {
    rejected(key).or_else(|| {
        file_name_for(key)
            .err()
            .map(|e| Completion::ready(Err(e)))
    })
}

fn path_for(directory: &Path, key: &str) -> Result<PathBuf> {
    Ok(directory.join(file_name_for(key)?))
}

fn temp_path_for(directory: &Path, name: &str) -> PathBuf {
    let seq = TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    directory.join(format!(
        ".{}.{}-{}{}",
        name,
        std::process::id(),
        seq,
        TEMP_SUFFIX
    ))
}

fn absent_on_not_found<T>(result: std::io::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_value(directory: &Path, key: &str, value: &str) -> Result<()> {
    let name = file_name_for(key)?;
    let temp = temp_path_for(directory, &name);
    let written =
        std::fs::write(&temp, value).and_then(|_| std::fs::rename(&temp, directory.join(&name)));
    if written.is_err() {
        let _ = std::fs::remove_file(&temp);
    }
    written.map_err(DataError::from)
}

async fn write_value_async(directory: &Path, key: &str, value: &str) -> Result<()> {
    let name = file_name_for(key)?;
    let temp = temp_path_for(directory, &name);
    let mut written = tokio::fs::write(&temp, value).await;
    if written.is_ok() {
        written = tokio::fs::rename(&temp, directory.join(&name)).await;
    }
    if written.is_err() {
        let _ = tokio::fs::remove_file(&temp).await;
    }
    written.map_err(DataError::from)
}

fn read_value(directory: &Path, key: &str) -> Result<Option<String>> {
    absent_on_not_found(std::fs::read_to_string(path_for(directory, key)?))
}

async fn read_value_async(directory: &Path, key: &str) -> Result<Option<String>> {
    absent_on_not_found(tokio::fs::read_to_string(path_for(directory, key)?).await)
}

fn delete_value(directory: &Path, key: &str) -> Result<()> {
    absent_on_not_found(std::fs::remove_file(path_for(directory, key)?)).map(|_| ())
}

async fn delete_value_async(directory: &Path, key: &str) -> Result<()> {
    absent_on_not_found(tokio::fs::remove_file(path_for(directory, key)?).await).map(|_| ())
}

fn key_of(name: &std::ffi::OsStr) -> Option<String> {
    let name = name.to_str()?;
    let key = unescape_key(name);
    if key.is_none() && !name.starts_with('.') {
        warn!("Ignoring foreign file in data directory: {}", name);
    }
    key
}

fn list_keys(directory: &Path) -> Result<HashSet<String>> {
    let mut keys = HashSet::new();
    for entry in std::fs::read_dir(directory)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            keys.extend(key_of(&entry.file_name()));
        }
    }
    Ok(keys)
}

async fn list_keys_async(directory: &Path) -> Result<HashSet<String>> {
    let mut keys = HashSet::new();
    let mut dir = tokio::fs::read_dir(directory).await?;
    while let Some(entry) = dir.next_entry().await? {
        if entry.file_type().await?.is_file() {
            keys.extend(key_of(&entry.file_name()));
        }
    }
    Ok(keys)
}

impl DataProvider<String> for FileDataProvider {
    fn put(&self, key: &str, value: String) -> Result<()> {
        write_value(&self.directory, key, &value)
    }

    fn put_all(&self, entries: HashMap<String, String>) -> Result<()> {
        for key in entries.keys() {
            file_name_for(key)?;
        }
        for (key, value) in &entries {
            write_value(&self.directory, key, value)?;
        }
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        read_value(&self.directory, key)
    }

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(path_for(&self.directory, key)?.is_file())
    }

    fn remove(&self, key: &str) -> Result<()> {
        delete_value(&self.directory, key)
    }

    fn get_and_remove(&self, key: &str) -> Result<Option<String>> {
        let value = read_value(&self.directory, key)?;
        if value.is_some() {
            delete_value(&self.directory, key)?;
        }
        Ok(value)
    }

    fn keys(&self) -> Result<HashSet<String>> {
        list_keys(&self.directory)
    }

    fn entries(&self) -> Result<HashMap<String, String>> {
        let mut entries = HashMap::new();
        for key in list_keys(&self.directory)? {
            if let Some(value) = read_value(&self.directory, &key)? {
                entries.insert(key, value);
            }
        }
        Ok(entries)
    }

    fn size(&self) -> Result<usize> {
        Ok(list_keys(&self.directory)?.len())
    }
}

impl AsyncDataProvider<String> for FileDataProvider {
    fn executor(&self) -> &Executor {
        &self.executor
    }

    #[instrument(skip(self, producer), level = "debug")]
    fn put_with(&self, key: &str, producer: Producer<String>) -> Completion<()> {
        if let Some(rejected) = rejected_name(key) {
            return rejected;
        }
        let key = key.to_string();
        self.submit("put", move |dir| async move {
            let value = producer()?;
            write_value_async(&dir, &key, &value).await
        })
    }

    fn put_all_with(&self, producer: Producer<HashMap<String, String>>) -> Completion<()> {
        self.submit("put_all", move |dir| async move {
            let entries = producer()?;
            for key in entries.keys() {
                file_name_for(key)?;
            }
            for (key, value) in &entries {
                write_value_async(&dir, key, value).await?;
            }
            Ok(())
        })
    }

    #[instrument(skip(self), level = "debug")]
    fn get(&self, key: &str) -> Completion<Option<String>> {
        if let Some(rejected) = rejected_name(key) {
            return rejected;
        }
        let key = key.to_string();
        self.submit("get", move |dir| async move {
            read_value_async(&dir, &key).await
        })
    }

    fn contains(&self, key: &str) -> Completion<bool> {
        if let Some(rejected) = rejected_name(key) {
            return rejected;
        }
        let key = key.to_string();
        self.submit("contains", move |dir| async move {
            match tokio::fs::metadata(path_for(&dir, &key)?).await {
                Ok(meta) => Ok(meta.is_file()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn remove(&self, key: &str) -> Completion<()> {
        if let Some(rejected) = rejected_name(key) {
            return rejected;
        }
        let key = key.to_string();
        self.submit("remove", move |dir| async move {
            delete_value_async(&dir, &key).await
        })
    }

    fn get_and_remove(&self, key: &str) -> Completion<Option<String>> {
        if let Some(rejected) = rejected_name(key) {
            return rejected;
        }
        let key = key.to_string();
        self.submit("get_and_remove", move |dir| async move {
            let value = read_value_async(&dir, &key).await?;
            if value.is_some() {
                delete_value_async(&dir, &key).await?;
            }
            Ok(value)
        })
    }

    fn keys(&self) -> Completion<HashSet<String>> {
        self.submit("keys", |dir| async move { list_keys_async(&dir).await })
    }

    fn entries(&self) -> Completion<HashMap<String, String>> {
        self.submit("entries", |dir| async move {
            let mut entries = HashMap::new();
            for key in list_keys_async(&dir).await? {
                if let Some(value) = read_value_async(&dir, &key).await? {
                    entries.insert(key, value);
                }
            }
            Ok(entries)
        })
    }

    fn size(&self) -> Completion<usize> {
        self.submit("size", |dir| async move {
            Ok(list_keys_async(&dir).await?.len())
        })
    }
}
