//! 事件处理器描述（HandlerDescriptor）
//!
//! 由外部发现机制（闭包注册或 `#[event_handlers]` 宏）产出，
//! 绑定三项信息：接收的事件类型、是否产生返回值、调用函数。
//! 核心只消费描述符，不关心其来源。
//!
use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// 类型擦除后的处理器返回值
pub type AnyValue = Box<dyn Any + Send>;

/// 单个处理器（或拦截器链）的执行结果：`None` 表示无返回值
pub type HandlerResult = anyhow::Result<Option<AnyValue>>;

type InvokeFn = Arc<dyn Fn(&(dyn Any + Send + Sync)) -> HandlerResult + Send + Sync>;

/// 事件的运行时类型：路由键为 `TypeId`，名称仅用于日志与错误
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventType {
    id: TypeId,
    name: &'static str,
}

impl EventType {
    pub fn of<E: Any>() -> Self {
        Self {
            id: TypeId::of::<E>(),
            name: type_name::<E>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// 处理器描述符
#[derive(Clone)]
pub struct HandlerDescriptor {
    name: String,
    event_type: EventType,
    value_type: Option<&'static str>,
    invoke: InvokeFn,
}

impl HandlerDescriptor {
    /// 无返回值处理器；同一事件类型可注册任意多个
    pub fn void<E, F>(name: impl Into<String>, f: F) -> Self
    where
        E: Any + Send + Sync,
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::new::<E>(name.into(), None, move |event: &E| {
            f(event)?;
            Ok(None)
        })
    }

    /// 带返回值处理器；同一事件类型至多注册一个
    pub fn returning<E, R, F>(name: impl Into<String>, f: F) -> Self
    where
        E: Any + Send + Sync,
        R: Any + Send,
        F: Fn(&E) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        Self::new::<E>(name.into(), Some(type_name::<R>()), move |event: &E| {
            let value = f(event)?;
            Ok(Some(Box::new(value) as AnyValue))
        })
    }

    fn new<E>(
        name: String,
        value_type: Option<&'static str>,
        f: impl Fn(&E) -> HandlerResult + Send + Sync + 'static,
    ) -> Self
    where
        E: Any + Send + Sync,
    {
        let invoke: InvokeFn = Arc::new(move |event: &(dyn Any + Send + Sync)| match event.downcast_ref::<E>() {
            Some(event) => f(event),
            // 正常情况下不会发生：注册表以 TypeId::of::<E>() 为键
            None => Err(anyhow::anyhow!(
                "event type mismatch: expected={}",
                type_name::<E>()
            )),
        });

        Self {
            name,
            event_type: EventType::of::<E>(),
            value_type,
            invoke,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn returns_value(&self) -> bool {
        self.value_type.is_some()
    }

    /// 带返回值处理器声明的值类型名
    pub fn value_type(&self) -> Option<&'static str> {
        self.value_type
    }

    /// 调用处理器；处理器 panic 时转换为失败，保证同一次分发中的其他处理器仍会执行
    pub fn invoke(&self, event: &(dyn Any + Send + Sync)) -> HandlerResult {
        match catch_unwind(AssertUnwindSafe(|| (self.invoke)(event))) {
            Ok(result) => result,
            Err(payload) => Err(anyhow::anyhow!(
                "handler panicked: {}",
                panic_message(payload.as_ref())
            )),
        }
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("name", &self.name)
            .field("event_type", &self.event_type.name)
            .field("value_type", &self.value_type)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

/// 订阅者：处理器发现能力
///
/// 将一个对象展开为零个或多个处理器描述符。
/// 通常由 `eventbus_macros::event_handlers` 生成，也可手动实现。
pub trait Subscriber: Send + Sync + 'static {
    fn handlers(self: Arc<Self>) -> Vec<HandlerDescriptor>;
}
