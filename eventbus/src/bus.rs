//! 事件总线（EventBus）
//!
//! 对外的发布/订阅入口，持有注册表、拦截器链工厂、分发引擎与执行策略：
//! - `Synchronous`：在调用方线程完成全部分发；
//! - `PerHandlerAsync`：调用方线程完成查找，处理器调用交给工作池；
//! - `FullPublishAsync`：整个分发交给工作池，`publish` 立即返回。
//!
//! 三种策略的结果语义一致：失败汇总规则相同，回调恰好完成一次。
//!
use crate::callback::{self, DispatchCallback, DispatchFuture, LogFailure, Resolve, Typed};
use crate::config::{DispatchMode, EventBusConfig};
use crate::dispatcher::Dispatcher;
use crate::error::DispatchResult;
use crate::handler::{EventType, HandlerDescriptor, Subscriber};
use crate::interceptor::{Interceptor, InterceptorChainFactory};
use crate::registry::InvokerRegistry;
use crate::worker_pool::WorkerPool;
use bon::bon;
use std::any::Any;
use std::io;
use std::sync::Arc;

enum Execution {
    Inline,
    PerHandler(WorkerPool),
    FullPublish(WorkerPool),
}

pub struct EventBus {
    registry: Arc<InvokerRegistry>,
    dispatcher: Arc<Dispatcher>,
    config: EventBusConfig,
    execution: Execution,
}

#[bon]
impl EventBus {
    /// 构建事件总线
    ///
    /// 异步模式下若未提供 `worker_pool`，按 `config` 自建工作池（可能因线程创建失败而返回错误）。
    /// 同步模式不使用工作池，传入 `worker_pool` 时返回 `InvalidInput`。
    #[builder]
    pub fn new(
        #[builder(default)] interceptors: Vec<Arc<dyn Interceptor>>,
        #[builder(default)] config: EventBusConfig,
        worker_pool: Option<WorkerPool>,
    ) -> io::Result<Self> {
        let execution = match config.mode {
            DispatchMode::Synchronous if worker_pool.is_some() => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "worker_pool requires an asynchronous dispatch mode",
                ));
            }
            DispatchMode::Synchronous => Execution::Inline,
            DispatchMode::PerHandlerAsync => {
                Execution::PerHandler(Self::pool_or_new(worker_pool, &config)?)
            }
            DispatchMode::FullPublishAsync => {
                Execution::FullPublish(Self::pool_or_new(worker_pool, &config)?)
            }
        };

        let registry = Arc::new(InvokerRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            InterceptorChainFactory::new(interceptors),
            config.failure_policy,
        ));

        Ok(Self {
            registry,
            dispatcher,
            config,
            execution,
        })
    }
}

impl Default for EventBus {
    /// 同步、无拦截器的事件总线
    fn default() -> Self {
        let registry = Arc::new(InvokerRegistry::new());
        let config = EventBusConfig::default();
        Self {
            dispatcher: Arc::new(Dispatcher::new(
                registry.clone(),
                InterceptorChainFactory::default(),
                config.failure_policy,
            )),
            registry,
            config,
            execution: Execution::Inline,
        }
    }
}

impl EventBus {
    fn pool_or_new(pool: Option<WorkerPool>, config: &EventBusConfig) -> io::Result<WorkerPool> {
        match pool {
            Some(pool) => Ok(pool),
            None => WorkerPool::new(config),
        }
    }

    pub fn mode(&self) -> DispatchMode {
        self.config.mode
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }

    pub fn registry(&self) -> &InvokerRegistry {
        &self.registry
    }

    /// 异步模式下的工作池
    pub fn worker_pool(&self) -> Option<&WorkerPool> {
        match &self.execution {
            Execution::Inline => None,
            Execution::PerHandler(pool) | Execution::FullPublish(pool) => Some(pool),
        }
    }

    /// 注册单个处理器描述符
    pub fn register(&self, descriptor: HandlerDescriptor) -> DispatchResult<()> {
        tracing::info!(
            handler = descriptor.name(),
            event = descriptor.event_type().name(),
            returns_value = descriptor.returns_value(),
            "adding event subscription"
        );
        self.registry.register(descriptor)
    }

    /// 注册订阅者产出的全部处理器；遇到第一个重复的带返回值处理器即停止
    pub fn subscribe<S: Subscriber>(&self, subscriber: Arc<S>) -> DispatchResult<()> {
        for descriptor in subscriber.handlers() {
            self.register(descriptor)?;
        }
        Ok(())
    }

    /// 以默认回调发布事件
    ///
    /// 同步模式下失败直接返回给调用方；异步模式下失败记录为错误日志。
    pub fn publish<E>(&self, event: E) -> DispatchResult<()>
    where
        E: Any + Send + Sync,
    {
        match &self.execution {
            Execution::Inline => {
                let event_type = EventType::of::<E>();
                tracing::debug!(event = event_type.name(), "received event for publication");
                let plan = self.dispatcher.plan(event_type)?;
                self.dispatcher.execute(&plan, &event).map(|_| ())
            }
            _ => self.publish_internal(event, LogFailure::new(EventType::of::<E>().name())),
        }
    }

    /// 以指定回调发布事件
    ///
    /// 同步与 `PerHandlerAsync` 模式下，找不到处理器时直接返回错误且回调不会被调用；
    /// `FullPublishAsync` 模式下该错误经由回调送达。
    pub fn publish_with<E, R, C>(&self, event: E, callback: C) -> DispatchResult<()>
    where
        E: Any + Send + Sync,
        R: Any,
        C: DispatchCallback<R>,
    {
        self.publish_internal(event, Typed::<R, C>::new(callback))
    }

    /// 发布事件并返回结果句柄；句柄与回调同步完成
    pub fn publish_future<E, R>(&self, event: E) -> DispatchResult<DispatchFuture<R>>
    where
        E: Any + Send + Sync,
        R: Any + Send,
    {
        let (callback, future) = callback::channel::<R>();
        self.publish_with::<E, R, _>(event, callback)?;
        Ok(future)
    }

    /// 停止接收新的异步分发；正在执行的处理器不受影响
    pub fn shutdown(&self) {
        if let Some(pool) = self.worker_pool() {
            pool.shutdown();
        }
    }

    fn publish_internal<E, K>(&self, event: E, resolve: K) -> DispatchResult<()>
    where
        E: Any + Send + Sync,
        K: Resolve,
    {
        let event_type = EventType::of::<E>();
        tracing::debug!(
            event = event_type.name(),
            mode = ?self.config.mode,
            "received event for publication"
        );

        match &self.execution {
            Execution::Inline => {
                let plan = self.dispatcher.plan(event_type)?;
                resolve.resolve(self.dispatcher.execute(&plan, &event));
            }
            Execution::PerHandler(pool) => {
                let plan = self.dispatcher.plan(event_type)?;
                let dispatcher = self.dispatcher.clone();
                pool.submit(resolve, move || dispatcher.execute(&plan, &event));
            }
            Execution::FullPublish(pool) => {
                let dispatcher = self.dispatcher.clone();
                pool.submit(resolve, move || {
                    let plan = dispatcher.plan(event_type)?;
                    dispatcher.execute(&plan, &event)
                });
            }
        }

        tracing::debug!(event = event_type.name(), "dispatched event");
        Ok(())
    }
}
