//! 分发引擎（Dispatcher）
//!
//! 一次分发的编排：
//! 1. 从注册表取出带返回值处理器与全部无返回值处理器，均不存在时立即失败；
//! 2. 先执行带返回值处理器，再逐个执行无返回值处理器（顺序不作为语义保证）；
//! 3. 任一处理器失败都不会阻止其余处理器执行，每个处理器恰好尝试一次；
//! 4. 汇总为单一结果：无失败时返回带返回值处理器的结果，否则按 `FailurePolicy` 汇总失败。
//!
use crate::callback::{DispatchCallback, Resolve, Typed};
use crate::config::FailurePolicy;
use crate::error::{DispatchError, DispatchResult};
use crate::handler::{AnyValue, EventType, HandlerDescriptor};
use crate::interceptor::InterceptorChainFactory;
use crate::registry::{Handlers, InvokerRegistry};
use std::any::{Any, type_name};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// 一次分发的类型擦除结果
pub type DispatchOutcome = Result<Option<ReturnValue>, DispatchError>;

/// 带返回值处理器产出的值，附带处理器声明的值类型名
pub struct ReturnValue {
    value: AnyValue,
    type_name: &'static str,
}

impl ReturnValue {
    pub fn new<R: Any + Send>(value: R) -> Self {
        Self {
            value: Box::new(value),
            type_name: type_name::<R>(),
        }
    }

    pub(crate) fn from_parts(value: AnyValue, type_name: &'static str) -> Self {
        Self { value, type_name }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 还原为具体类型；类型不符时原样返回
    pub fn downcast<R: Any>(self) -> Result<R, Self> {
        match self.value.downcast::<R>() {
            Ok(value) => Ok(*value),
            Err(value) => Err(Self {
                value,
                type_name: self.type_name,
            }),
        }
    }
}

impl std::fmt::Debug for ReturnValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReturnValue")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// 已通过查找的分发计划
#[derive(Clone, Debug)]
pub struct DispatchPlan {
    event_type: EventType,
    handlers: Handlers,
}

impl DispatchPlan {
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn handlers(&self) -> &Handlers {
        &self.handlers
    }
}

pub struct Dispatcher {
    registry: Arc<InvokerRegistry>,
    chains: InterceptorChainFactory,
    failure_policy: FailurePolicy,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<InvokerRegistry>,
        chains: InterceptorChainFactory,
        failure_policy: FailurePolicy,
    ) -> Self {
        Self {
            registry,
            chains,
            failure_policy,
        }
    }

    /// 分发事件并完成回调
    ///
    /// 找不到处理器时直接返回 `DispatchError::HandlerNotFound`，回调不会被调用；
    /// 其余情况回调恰好完成一次。
    pub fn dispatch<E, R, C>(&self, event: &E, callback: C) -> DispatchResult<()>
    where
        E: Any + Send + Sync,
        R: Any,
        C: DispatchCallback<R>,
    {
        let plan = self.plan(EventType::of::<E>())?;
        Typed::<R, C>::new(callback).resolve(self.execute(&plan, event));
        Ok(())
    }

    /// 查找处理器；均不存在时失败
    pub fn plan(&self, event_type: EventType) -> DispatchResult<DispatchPlan> {
        let handlers = self.registry.lookup(event_type);
        if handlers.is_empty() {
            return Err(DispatchError::HandlerNotFound {
                event: event_type.name(),
            });
        }

        Ok(DispatchPlan {
            event_type,
            handlers,
        })
    }

    /// 执行计划中的全部处理器并汇总结果
    pub fn execute(&self, plan: &DispatchPlan, event: &(dyn Any + Send + Sync)) -> DispatchOutcome {
        tracing::debug!(
            event = plan.event_type.name(),
            handlers = plan.handlers.len(),
            "dispatching event"
        );

        let mut failures = Failures::new(self.failure_policy);
        let mut value = None;

        // 带返回值的处理器优先执行
        if let Some(descriptor) = &plan.handlers.returning {
            match self.run_chain(plan.event_type, descriptor, event) {
                Ok(v) => {
                    let declared = descriptor.value_type().unwrap_or("unknown");
                    value = v.map(|v| ReturnValue::from_parts(v, declared));
                }
                Err(e) => failures.capture(e),
            }
        }

        for descriptor in &plan.handlers.void {
            if let Err(e) = self.run_chain(plan.event_type, descriptor, event) {
                failures.capture(e);
            }
        }

        match failures.into_error() {
            Some(error) => Err(error),
            None => Ok(value),
        }
    }

    fn run_chain(
        &self,
        event_type: EventType,
        descriptor: &HandlerDescriptor,
        event: &(dyn Any + Send + Sync),
    ) -> Result<Option<AnyValue>, DispatchError> {
        let chain = self.chains.create_chain(event, descriptor);
        // 拦截器自身的 panic 同样视为该处理器失败
        let result = catch_unwind(AssertUnwindSafe(|| chain.proceed())).unwrap_or_else(|_| {
            Err(anyhow::anyhow!(
                "interceptor chain panicked for handler {}",
                descriptor.name()
            ))
        });

        result.map_err(|source| {
            tracing::warn!(
                handler = descriptor.name(),
                event = event_type.name(),
                error = %source,
                "handler failed, continuing with remaining handlers"
            );
            DispatchError::Invocation {
                handler: descriptor.name().to_string(),
                event: event_type.name(),
                source,
            }
        })
    }
}

struct Failures {
    policy: FailurePolicy,
    captured: Vec<DispatchError>,
}

impl Failures {
    fn new(policy: FailurePolicy) -> Self {
        Self {
            policy,
            captured: Vec::new(),
        }
    }

    fn capture(&mut self, error: DispatchError) {
        if self.policy == FailurePolicy::LastWins {
            self.captured.clear();
        }
        self.captured.push(error);
    }

    fn into_error(mut self) -> Option<DispatchError> {
        match self.captured.len() {
            0 | 1 => self.captured.pop(),
            _ => Some(DispatchError::Multiple(self.captured)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::channel;
    use std::sync::Mutex;

    struct Greet {
        name: &'static str,
    }

    struct Unhandled;

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn dispatcher(policy: FailurePolicy, descriptors: Vec<HandlerDescriptor>) -> Dispatcher {
        let registry = Arc::new(InvokerRegistry::new());
        for d in descriptors {
            registry.register(d).unwrap();
        }
        Dispatcher::new(registry, InterceptorChainFactory::default(), policy)
    }

    fn void(name: &'static str, log: &Log, fail: bool) -> HandlerDescriptor {
        let log = log.clone();
        HandlerDescriptor::void::<Greet, _>(name, move |_| {
            log.lock().unwrap().push(name);
            if fail {
                anyhow::bail!("{name} failed");
            }
            Ok(())
        })
    }

    fn greeter(log: &Log, fail: bool) -> HandlerDescriptor {
        let log = log.clone();
        HandlerDescriptor::returning::<Greet, String, _>("greeter", move |g| {
            log.lock().unwrap().push("greeter");
            if fail {
                anyhow::bail!("greeter failed");
            }
            Ok(format!("Hello {}", g.name))
        })
    }

    #[test]
    fn returning_handler_value_reaches_callback() {
        let log = Log::default();
        let d = dispatcher(FailurePolicy::LastWins, vec![greeter(&log, false)]);
        let (cb, fut) = channel::<String>();

        d.dispatch(&Greet { name: "Ada" }, cb).unwrap();

        assert_eq!(fut.wait().unwrap(), Some("Hello Ada".to_string()));
    }

    #[test]
    fn not_found_bypasses_callback() {
        let d = dispatcher(FailurePolicy::LastWins, vec![]);
        let (cb, fut) = channel::<()>();

        let err = d.dispatch(&Unhandled, cb).unwrap_err();

        assert!(matches!(err, DispatchError::HandlerNotFound { event } if event.ends_with("Unhandled")));
        // 回调随 dispatch 一起被丢弃，从未被调用
        assert!(matches!(fut.wait(), Err(DispatchError::Rejected { .. })));
    }

    #[test]
    fn returning_handler_runs_first_and_all_handlers_run() {
        let log = Log::default();
        let d = dispatcher(
            FailurePolicy::LastWins,
            vec![void("a", &log, false), greeter(&log, true), void("b", &log, false)],
        );
        let (cb, fut) = channel::<String>();

        d.dispatch(&Greet { name: "Ada" }, cb).unwrap();

        let seen = log.lock().unwrap().clone();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], "greeter");
        assert_eq!(fut.wait().unwrap_err().handler(), Some("greeter"));
    }

    #[test]
    fn last_failure_wins_and_discards_value() {
        let log = Log::default();
        let d = dispatcher(
            FailurePolicy::LastWins,
            vec![greeter(&log, true), void("v", &log, true)],
        );
        let (cb, fut) = channel::<String>();

        d.dispatch(&Greet { name: "Ada" }, cb).unwrap();

        assert_eq!(fut.wait().unwrap_err().handler(), Some("v"));
    }

    #[test]
    fn void_failure_discards_successful_value() {
        let log = Log::default();
        let d = dispatcher(
            FailurePolicy::LastWins,
            vec![greeter(&log, false), void("v", &log, true)],
        );

        let plan = d.plan(EventType::of::<Greet>()).unwrap();
        let err = d.execute(&plan, &Greet { name: "Ada" }).unwrap_err();

        assert_eq!(err.handler(), Some("v"));
    }

    #[test]
    fn collect_all_keeps_every_failure_in_order() {
        let log = Log::default();
        let d = dispatcher(
            FailurePolicy::CollectAll,
            vec![greeter(&log, true), void("v", &log, true)],
        );

        let plan = d.plan(EventType::of::<Greet>()).unwrap();
        match d.execute(&plan, &Greet { name: "Ada" }).unwrap_err() {
            DispatchError::Multiple(errors) => {
                let names: Vec<_> = errors.iter().filter_map(|e| e.handler()).collect();
                assert_eq!(names, vec!["greeter", "v"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn collect_all_with_single_failure_is_unwrapped() {
        let log = Log::default();
        let d = dispatcher(FailurePolicy::CollectAll, vec![void("v", &log, true)]);

        let plan = d.plan(EventType::of::<Greet>()).unwrap();
        let err = d.execute(&plan, &Greet { name: "Ada" }).unwrap_err();

        assert!(matches!(err, DispatchError::Invocation { .. }));
    }

    #[test]
    fn void_only_success_has_no_value() {
        let log = Log::default();
        let d = dispatcher(
            FailurePolicy::LastWins,
            vec![void("a", &log, false), void("b", &log, false)],
        );
        let (cb, fut) = channel::<()>();

        d.dispatch(&Greet { name: "Ada" }, cb).unwrap();

        assert_eq!(fut.wait().unwrap(), None);
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[test]
    fn panicking_handler_does_not_stop_others() {
        let log = Log::default();
        let d = dispatcher(
            FailurePolicy::LastWins,
            vec![
                HandlerDescriptor::void::<Greet, _>("explosive", |_| panic!("kaboom")),
                void("after", &log, false),
            ],
        );

        let plan = d.plan(EventType::of::<Greet>()).unwrap();
        let err = d.execute(&plan, &Greet { name: "Ada" }).unwrap_err();

        assert_eq!(err.handler(), Some("explosive"));
        assert_eq!(*log.lock().unwrap(), vec!["after"]);
    }
}
