//! 进程内事件/命令分发库（eventbus）
//!
//! 将一个事件按运行时类型路由到已注册的处理器：
//! - 注册表（`registry`）：每个事件类型至多一个带返回值处理器，任意多个无返回值处理器
//! - 拦截器（`interceptor`）：环绕每次处理器调用的有序链，可短路、重试或改写结果
//! - 分发引擎（`dispatcher`）：带返回值处理器优先、逐个扇出、汇总失败
//! - 工作池（`worker_pool`）与事件总线（`bus`）：同步、按处理器异步、整体异步三种执行策略
//! - 回调（`callback`）：恰好完成一次的结果通知，以及基于其上的 `DispatchFuture`
//!
//! 处理器可通过闭包构造 `HandlerDescriptor` 注册，也可借助 `eventbus_macros::event_handlers`
//! 从带 `#[handles]` 标记的方法批量生成。
//!
//! 典型用法：
//! 1. `EventBus::builder()` 选择执行策略与拦截器；
//! 2. `register` / `subscribe` 注册处理器；
//! 3. `publish` / `publish_with` / `publish_future` 发布事件并取得结果。
//!
pub mod bus;
pub mod callback;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod interceptor;
pub mod registry;
pub mod worker_pool;

pub use bus::EventBus;
pub use callback::{DispatchCallback, DispatchFuture, FutureCallback, channel, from_fns};
pub use config::{DispatchMode, EventBusConfig, FailurePolicy};
pub use dispatcher::ReturnValue;
pub use error::{DispatchError, DispatchResult};
pub use handler::{AnyValue, EventType, HandlerDescriptor, HandlerResult, Subscriber};
pub use interceptor::{InvocationContext, Interceptor, LoggingInterceptor, Next};

// 允许在本 crate 内部通过 ::eventbus 进行自引用，
// 以便过程宏在本 crate 的单元测试中也能解析到 ::eventbus 路径。
extern crate self as eventbus;
