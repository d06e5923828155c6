//! 分发回调（DispatchCallback）与 Future 桥接
//!
//! 每次通过查找的发布恰好完成一次回调：`succeeded` 与 `failed` 二选一，
//! 两者均按值消费回调，由所有权保证“恰好一次”。
//! `DispatchFuture` 只是回调协议之上的薄适配层（oneshot 通道），
//! 与回调共享同一条完成路径。
//!
use crate::dispatcher::DispatchOutcome;
use crate::error::{DispatchError, DispatchResult};
use std::any::{Any, type_name};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// 分发完成回调
pub trait DispatchCallback<R>: Send + 'static {
    /// 全部处理器成功；`value` 为带返回值处理器的结果（不存在时为 `None`）
    fn succeeded(self, value: Option<R>);

    /// 至少一个处理器失败
    fn failed(self, error: DispatchError);

    /// 异步模式下，任务开始前会检查该标记；为 `true` 时以 `DispatchError::Cancelled` 完成
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// 由两个闭包组成的回调
pub struct FnCallback<S, F> {
    on_success: S,
    on_failure: F,
}

/// 以闭包构造回调
pub fn from_fns<R, S, F>(on_success: S, on_failure: F) -> FnCallback<S, F>
where
    S: FnOnce(Option<R>) + Send + 'static,
    F: FnOnce(DispatchError) + Send + 'static,
{
    FnCallback {
        on_success,
        on_failure,
    }
}

impl<R, S, F> DispatchCallback<R> for FnCallback<S, F>
where
    S: FnOnce(Option<R>) + Send + 'static,
    F: FnOnce(DispatchError) + Send + 'static,
{
    fn succeeded(self, value: Option<R>) {
        (self.on_success)(value)
    }

    fn failed(self, error: DispatchError) {
        (self.on_failure)(error)
    }
}

/// 创建一对回调与 Future：回调完成时 Future 随之就绪
pub fn channel<R>() -> (FutureCallback<R>, DispatchFuture<R>) {
    let (tx, rx) = oneshot::channel();
    let token = CancellationToken::new();
    (
        FutureCallback {
            tx,
            token: token.clone(),
        },
        DispatchFuture { rx, token },
    )
}

/// 写入 oneshot 通道的回调
pub struct FutureCallback<R> {
    tx: oneshot::Sender<DispatchResult<Option<R>>>,
    token: CancellationToken,
}

impl<R: Send + 'static> DispatchCallback<R> for FutureCallback<R> {
    fn succeeded(self, value: Option<R>) {
        // 接收端已丢弃时结果无人关心，忽略
        let _ = self.tx.send(Ok(value));
    }

    fn failed(self, error: DispatchError) {
        let _ = self.tx.send(Err(error));
    }

    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// 分发结果句柄
///
/// - 可 `.await`（任意异步运行时）；
/// - 可在非异步线程中 `wait()` 阻塞等待；
/// - `cancel()` 仅阻止尚未开始的任务，不会中断正在执行的处理器。
#[must_use = "dropping the future discards the dispatch outcome"]
pub struct DispatchFuture<R> {
    rx: oneshot::Receiver<DispatchResult<Option<R>>>,
    token: CancellationToken,
}

impl<R> DispatchFuture<R> {
    /// 阻塞当前线程直至分发完成
    ///
    /// # Panics
    /// 在异步运行时的工作线程中调用会 panic（同 `oneshot::Receiver::blocking_recv`）。
    pub fn wait(self) -> DispatchResult<Option<R>> {
        self.rx.blocking_recv().unwrap_or_else(|_| Err(dropped()))
    }

    /// 请求取消尚未开始的分发
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl<R> fmt::Debug for DispatchFuture<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchFuture")
            .field("value", &type_name::<R>())
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<R> Future for DispatchFuture<R> {
    type Output = DispatchResult<Option<R>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx)
            .poll(cx)
            .map(|r| r.unwrap_or_else(|_| Err(dropped())))
    }
}

fn dropped() -> DispatchError {
    DispatchError::rejected("dispatch dropped before completion")
}

/// 内部完成协议：接收类型擦除后的分发结果
pub(crate) trait Resolve: Send + 'static {
    fn resolve(self, outcome: DispatchOutcome);

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// 将类型擦除的结果还原为 `R` 后交给用户回调
pub(crate) struct Typed<R, C> {
    callback: C,
    _value: PhantomData<fn() -> R>,
}

impl<R, C> Typed<R, C> {
    pub(crate) fn new(callback: C) -> Self {
        Self {
            callback,
            _value: PhantomData,
        }
    }
}

impl<R, C> Resolve for Typed<R, C>
where
    R: Any,
    C: DispatchCallback<R>,
{
    fn resolve(self, outcome: DispatchOutcome) {
        match outcome {
            Ok(None) => self.callback.succeeded(None),
            Ok(Some(value)) => match value.downcast::<R>() {
                Ok(value) => self.callback.succeeded(Some(value)),
                Err(value) => self.callback.failed(DispatchError::TypeMismatch {
                    expected: type_name::<R>(),
                    found: value.type_name(),
                }),
            },
            Err(error) => self.callback.failed(error),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.callback.is_cancelled()
    }
}

/// 异步模式下 `publish(event)` 的默认回调：失败时记录错误日志
pub(crate) struct LogFailure {
    event: &'static str,
}

impl LogFailure {
    pub(crate) fn new(event: &'static str) -> Self {
        Self { event }
    }
}

impl Resolve for LogFailure {
    fn resolve(self, outcome: DispatchOutcome) {
        if let Err(error) = outcome {
            tracing::error!(event = self.event, error = %error, "event dispatch failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::ReturnValue;
    use std::sync::{Arc, Mutex};

    #[test]
    fn typed_resolution_downcasts_value() {
        let (cb, fut) = channel::<String>();
        Typed::<String, _>::new(cb).resolve(Ok(Some(ReturnValue::new("Hello Ada".to_string()))));

        assert_eq!(fut.wait().unwrap(), Some("Hello Ada".to_string()));
    }

    #[test]
    fn wrong_value_type_is_reported_as_mismatch() {
        let (cb, fut) = channel::<u32>();
        Typed::<u32, _>::new(cb).resolve(Ok(Some(ReturnValue::new("nope"))));

        match fut.wait().unwrap_err() {
            DispatchError::TypeMismatch { expected, found } => {
                assert_eq!(expected, "u32");
                assert_eq!(found, "&str");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn fn_callback_routes_failure() {
        let seen = Arc::new(Mutex::new(None));
        let succeeded = Arc::new(Mutex::new(false));
        let sink = seen.clone();
        let flag = succeeded.clone();
        let cb = from_fns(
            move |_: Option<()>| *flag.lock().unwrap() = true,
            move |e: DispatchError| *sink.lock().unwrap() = Some(e.to_string()),
        );

        Typed::<(), _>::new(cb).resolve(Err(DispatchError::Cancelled));

        assert!(!*succeeded.lock().unwrap());
        assert_eq!(
            seen.lock().unwrap().as_deref(),
            Some("dispatch cancelled before it started")
        );
    }

    #[test]
    fn cancel_is_visible_through_callback() {
        let (cb, fut) = channel::<()>();
        let typed = Typed::<(), _>::new(cb);
        assert!(!typed.is_cancelled());

        fut.cancel();
        assert!(typed.is_cancelled());
        assert!(fut.is_cancelled());
    }

    #[test]
    fn future_debug_shows_value_type_and_cancellation() {
        let (_cb, fut) = channel::<u32>();
        fut.cancel();

        let printed = format!("{fut:?}");
        assert!(printed.starts_with("DispatchFuture"));
        assert!(printed.contains("\"u32\""));
        assert!(printed.contains("cancelled: true"));
    }

    #[test]
    fn dropped_callback_rejects_future() {
        let (cb, fut) = channel::<()>();
        drop(cb);

        assert!(matches!(fut.wait(), Err(DispatchError::Rejected { .. })));
    }

    #[tokio::test]
    async fn future_can_be_awaited() {
        let (cb, fut) = channel::<u8>();
        cb.succeeded(Some(7));

        assert_eq!(fut.await.unwrap(), Some(7));
    }
}
