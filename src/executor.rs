//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了提供者的串行执行上下文和完成句柄。
//!
//! 每个提供者拥有一个 [`Executor`]：一个后台 tokio 任务按提交顺序逐个执行工作单元。
//! 调用方拿到的 [`Completion`] 是一个 future，等待它是可选的。

use crate::error::{DataError, Result};
use crate::metrics::GLOBAL_METRICS;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type Job = BoxFuture<'static, ()>;

/// 异步操作的完成句柄
///
/// 解析为该工作单元的 `Result`。丢弃句柄不会取消已提交的工作。
#[must_use = "dropping a Completion does not cancel the work, but its outcome is lost"]
pub struct Completion<T> {
    inner: BoxFuture<'static, Result<T>>,
}

impl<T: Send + 'static> Completion<T> {
    /// 由任意 future 构造完成句柄
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            inner: future.boxed(),
        }
    }

    /// 构造一个已完成的句柄
    pub fn ready(result: Result<T>) -> Self {
        Self {
            inner: futures::future::ready(result).boxed(),
        }
    }

    /// 对成功结果做转换，转换本身可能失败
    pub fn map<U, F>(self, f: F) -> Completion<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        Completion::from_future(async move { f(self.await?) })
    }

    /// 不等待地取结果：已经完成时返回结果，否则交还句柄
    pub fn try_resolve(mut self) -> std::result::Result<Result<T>, Self> {
        let mut cx = Context::from_waker(futures::task::noop_waker_ref());
        match self.inner.as_mut().poll(&mut cx) {
            Poll::Ready(result) => Ok(result),
            Poll::Pending => Err(self),
        }
    }

    /// 带超时地等待结果
    pub async fn wait_timeout(self, timeout: Duration) -> Result<T> {
        match tokio::time::timeout(timeout, self).await {
            Ok(result) => result,
            Err(_) => Err(DataError::Timeout(format!(
                "completion not resolved within {:?}",
                timeout
            ))),
        }
    }
}

impl<T> Future for Completion<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl<T> std::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion").finish_non_exhaustive()
    }
}

struct ExecutorInner {
    name: String,
    sender: mpsc::UnboundedSender<Job>,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// 串行执行上下文
///
/// 克隆得到的句柄共享同一个后台工作任务。必须在 tokio 运行时内创建。
#[derive(Clone)]
pub struct Executor {
    inner: Arc<ExecutorInner>,
}

impl Executor {
    /// 创建执行上下文并启动后台工作任务
    ///
    /// # 参数
    ///
    /// * `name` - 执行上下文名称，用于日志和指标
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let (sender, receiver) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(Self::run(name.clone(), receiver, shutdown.clone()));

        debug!("Executor {} started", name);

        Self {
            inner: Arc::new(ExecutorInner {
                name,
                sender,
                shutdown,
                worker: Mutex::new(Some(worker)),
            }),
        }
    }

    async fn run(
        name: String,
        mut receiver: mpsc::UnboundedReceiver<Job>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                job = receiver.recv() => match job {
                    Some(job) => job.await,
                    None => break,
                },
                _ = shutdown.cancelled() => {
                    receiver.close();
                    while let Some(job) = receiver.recv().await {
                        job.await;
                    }
                    break;
                }
            }
        }
        debug!("Executor {} stopped", name);
    }

    /// 执行上下文名称
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// 是否已经请求关闭
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// 提交一个工作单元
    ///
    /// 工作单元按提交顺序执行。失败或 panic 只影响该单元的结果。
    ///
    /// # 参数
    ///
    /// * `operation` - 操作名称，用于日志和指标
    /// * `work` - 要执行的 future
    ///
    /// # 返回值
    ///
    /// 返回该工作单元的完成句柄；关闭后提交会立即得到 `Shutdown` 错误
    pub fn submit<T, F>(&self, operation: &'static str, work: F) -> Completion<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        if self.is_shutdown() {
            return Completion::ready(Err(self.closed_error()));
        }

        let (tx, rx) = oneshot::channel();
        let name = self.inner.name.clone();
        let job = async move {
            let start = Instant::now();
            let result = match AssertUnwindSafe(work).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(DataError::Backend(format!(
                    "{} panicked on executor {}",
                    operation, name
                ))),
            };

            GLOBAL_METRICS.record_duration(&name, operation, start.elapsed().as_secs_f64());
            GLOBAL_METRICS.record_request(
                &name,
                operation,
                if result.is_ok() { "success" } else { "failure" },
            );

            if let Err(Err(e)) = tx.send(result) {
                warn!("{} on executor {} failed with no listener: {}", operation, name, e);
            }
        }
        .boxed();

        if self.inner.sender.send(job).is_err() {
            return Completion::ready(Err(self.closed_error()));
        }

        let name = self.inner.name.clone();
        Completion::from_future(async move {
            rx.await.map_err(|_| {
                DataError::Shutdown(format!("executor {} dropped {}", name, operation))
            })?
        })
    }

    /// 关闭执行上下文
    ///
    /// 停止接收新工作，执行完已排队的工作后退出。不能在本上下文的工作单元内等待。
    pub async fn shutdown(&self) -> Result<()> {
        self.inner.shutdown.cancel();

        let worker = {
            let mut guard = self
                .inner
                .worker
                .lock()
                .map_err(|e| DataError::Shutdown(e.to_string()))?;
            guard.take()
        };

        if let Some(worker) = worker {
            worker
                .await
                .map_err(|e| DataError::Shutdown(e.to_string()))?;
        }
        Ok(())
    }

    fn closed_error(&self) -> DataError {
        DataError::Shutdown(format!("executor {} is shut down", self.inner.name))
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("name", &self.inner.name)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
