//! 拦截器链（InterceptorChain）
//!
//! 为每个（事件，处理器）组合构建一条一次性的调用链：
//! 拦截器按配置顺序由外向内包裹，链尾为实际的处理器调用。
//! 链以“拦截器切片 + 游标”表示，而非嵌套闭包：
//! - `InterceptorChain::proceed(self)` 消费链本身，只能启动一次；
//! - 拦截器拿到的 `Next` 可调用零次（短路）或多次（重试）。
//!
use crate::handler::{EventType, HandlerDescriptor, HandlerResult};
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 单次处理器调用的上下文
pub struct InvocationContext<'a> {
    event: &'a (dyn Any + Send + Sync),
    descriptor: &'a HandlerDescriptor,
}

impl<'a> InvocationContext<'a> {
    pub fn event(&self) -> &'a (dyn Any + Send + Sync) {
        self.event
    }

    /// 以具体类型读取事件
    pub fn event_as<E: Any>(&self) -> Option<&'a E> {
        self.event.downcast_ref::<E>()
    }

    pub fn event_type(&self) -> EventType {
        self.descriptor.event_type()
    }

    pub fn handler_name(&self) -> &'a str {
        self.descriptor.name()
    }

    pub fn returns_value(&self) -> bool {
        self.descriptor.returns_value()
    }
}

/// 拦截器：横切于处理器调用之外（日志、重试、鉴权等）
///
/// 实现必须调用 `next.proceed()` 以继续执行，或自行返回结果/失败以短路。
pub trait Interceptor: Send + Sync {
    fn intercept(&self, ctx: &InvocationContext<'_>, next: Next<'_>) -> HandlerResult;
}

/// 链中的“下一步”：指向拦截器切片中的位置
#[derive(Clone, Copy)]
pub struct Next<'a> {
    interceptors: &'a [Arc<dyn Interceptor>],
    index: usize,
    ctx: &'a InvocationContext<'a>,
}

impl Next<'_> {
    /// 执行链的剩余部分
    pub fn proceed(&self) -> HandlerResult {
        match self.interceptors.get(self.index) {
            Some(interceptor) => interceptor.intercept(
                self.ctx,
                Next {
                    index: self.index + 1,
                    ..*self
                },
            ),
            None => self.ctx.descriptor.invoke(self.ctx.event),
        }
    }
}

/// 一次性拦截器链
pub struct InterceptorChain<'a> {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    ctx: InvocationContext<'a>,
}

impl InterceptorChain<'_> {
    /// 启动调用链；链被消费，不可复用
    pub fn proceed(self) -> HandlerResult {
        Next {
            interceptors: &self.interceptors,
            index: 0,
            ctx: &self.ctx,
        }
        .proceed()
    }
}

/// 拦截器链工厂：持有总线构建时配置的拦截器列表
#[derive(Clone)]
pub struct InterceptorChainFactory {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
}

impl Default for InterceptorChainFactory {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl InterceptorChainFactory {
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        Self {
            interceptors: interceptors.into(),
        }
    }

    pub fn create_chain<'a>(
        &self,
        event: &'a (dyn Any + Send + Sync),
        descriptor: &'a HandlerDescriptor,
    ) -> InterceptorChain<'a> {
        InterceptorChain {
            interceptors: self.interceptors.clone(),
            ctx: InvocationContext { event, descriptor },
        }
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

/// 以 `tracing` 记录每次处理器调用
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingInterceptor;

impl Interceptor for LoggingInterceptor {
    fn intercept(&self, ctx: &InvocationContext<'_>, next: Next<'_>) -> HandlerResult {
        let started = Instant::now();
        tracing::debug!(
            handler = ctx.handler_name(),
            event = ctx.event_type().name(),
            "invoking event handler"
        );

        let result = next.proceed();
        let elapsed_us = elapsed_micros(started.elapsed());

        match &result {
            Ok(_) => tracing::debug!(
                handler = ctx.handler_name(),
                event = ctx.event_type().name(),
                elapsed_us,
                "event handler finished"
            ),
            Err(err) => tracing::warn!(
                handler = ctx.handler_name(),
                event = ctx.event_type().name(),
                elapsed_us,
                error = %err,
                "event handler failed"
            ),
        }

        result
    }
}

/// 微秒数超出 `u64` 时取饱和值
fn elapsed_micros(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
}
