//! 工作池（WorkerPool）
//!
//! 异步分发模式的执行载体，基于 tokio 阻塞线程池：
//! - 处理器为同步调用，统一通过 `spawn_blocking` 执行；
//! - 同时执行的分发任务数受 `worker_threads` 限制（自有运行时的阻塞线程上限）；
//! - 已提交未完成的任务数受 `max_pending` 限制，超出时立即以 `Rejected` 完成回调；
//! - 工作池被丢弃后，尚未开始的任务不再执行，以 `Rejected` 完成回调；
//! - 任务在开始前被丢弃（运行时关闭等）时，由守卫以 `Rejected` 完成回调，
//!   保证回调恰好完成一次。
//!
use crate::callback::Resolve;
use crate::config::EventBusConfig;
use crate::dispatcher::DispatchOutcome;
use crate::error::DispatchError;
use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

pub struct WorkerPool {
    // 仅在自建运行时时持有；Drop 时以 shutdown_background 关闭
    runtime: Option<Runtime>,
    handle: Handle,
    permits: Arc<Semaphore>,
    max_pending: usize,
    shutdown: CancellationToken,
    // 仅在 Drop 时取消：尚未开始的任务不再执行
    dropped: CancellationToken,
}

impl WorkerPool {
    /// 自建专用运行时（线程名 `eventbus-worker`）
    pub fn new(config: &EventBusConfig) -> io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(config.worker_threads.max(1))
            .thread_name("eventbus-worker")
            .build()?;
        let handle = runtime.handle().clone();

        tracing::debug!(
            worker_threads = config.worker_threads.max(1),
            max_pending = config.max_pending,
            "event bus worker pool started"
        );

        Ok(Self::with_parts(Some(runtime), handle, config.max_pending))
    }

    /// 复用已有的 tokio 运行时；并发上限由该运行时的阻塞线程池决定
    pub fn from_handle(handle: Handle, max_pending: usize) -> Self {
        Self::with_parts(None, handle, max_pending)
    }

    fn with_parts(runtime: Option<Runtime>, handle: Handle, max_pending: usize) -> Self {
        let max_pending = max_pending.max(1);
        Self {
            runtime,
            handle,
            permits: Arc::new(Semaphore::new(max_pending)),
            max_pending,
            shutdown: CancellationToken::new(),
            dropped: CancellationToken::new(),
        }
    }

    /// 已提交但尚未完成的任务数
    pub fn pending(&self) -> usize {
        self.max_pending - self.permits.available_permits()
    }

    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    /// 停止接收新任务；已提交的任务继续执行
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// 提交一次分发任务；任何无法执行的情况都通过 `resolve` 报告
    pub(crate) fn submit<K, F>(&self, resolve: K, job: F)
    where
        K: Resolve,
        F: FnOnce() -> DispatchOutcome + Send + 'static,
    {
        if self.is_shutdown() {
            tracing::warn!("event bus worker pool is shut down, rejecting dispatch");
            resolve.resolve(Err(DispatchError::rejected("worker pool is shut down")));
            return;
        }

        let Ok(permit) = self.permits.clone().try_acquire_owned() else {
            tracing::warn!(
                max_pending = self.max_pending,
                "event bus worker pool saturated, rejecting dispatch"
            );
            resolve.resolve(Err(DispatchError::rejected(format!(
                "worker pool saturated: max_pending={}",
                self.max_pending
            ))));
            return;
        };

        let guard = ResolveGuard::new(resolve);
        let dropped = self.dropped.clone();
        // JoinHandle 直接丢弃：结果经由回调返回
        let _ = self.handle.spawn_blocking(move || {
            let _permit = permit;

            if dropped.is_cancelled() {
                guard.resolve(Err(DispatchError::rejected("worker pool dropped")));
                return;
            }
            if guard.is_cancelled() {
                guard.resolve(Err(DispatchError::Cancelled));
                return;
            }

            let outcome = catch_unwind(AssertUnwindSafe(job))
                .unwrap_or_else(|_| Err(DispatchError::rejected("dispatch job panicked")));
            guard.resolve(outcome);
        });
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.dropped.cancel();
        if let Some(runtime) = self.runtime.take() {
            // 不等待正在运行的处理器；未开始的任务以 Rejected 完成回调
            runtime.shutdown_background();
        }
    }
}

/// 保证回调恰好完成一次：任务未执行即被丢弃时以 `Rejected` 完成
struct ResolveGuard<K: Resolve> {
    inner: Option<K>,
}

impl<K: Resolve> ResolveGuard<K> {
    fn new(inner: K) -> Self {
        Self { inner: Some(inner) }
    }

    fn is_cancelled(&self) -> bool {
        self.inner.as_ref().is_some_and(|k| k.is_cancelled())
    }

    fn resolve(mut self, outcome: DispatchOutcome) {
        if let Some(inner) = self.inner.take() {
            inner.resolve(outcome);
        }
    }
}

impl<K: Resolve> Drop for ResolveGuard<K> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.resolve(Err(DispatchError::rejected(
                "dispatch job dropped before it ran",
            )));
        }
    }
}
