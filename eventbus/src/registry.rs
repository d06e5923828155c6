//! 处理器注册表（InvokerRegistry）
//!
//! 以事件的运行时类型（`TypeId`）为键保存处理器描述符：
//! - 每个事件类型至多一个带返回值的处理器；
//! - 无返回值处理器按注册顺序累积（顺序不作为对外语义保证）。
//!
//! 基于 `DashMap` 的分片锁实现，注册与查找可并发进行，
//! 读取方不会观察到注册到一半的描述符。
//!
use crate::error::{DispatchError, DispatchResult};
use crate::handler::{EventType, HandlerDescriptor};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::any::TypeId;
use std::sync::Arc;

#[derive(Default)]
struct HandlerSlot {
    event_name: &'static str,
    returning: Option<Arc<HandlerDescriptor>>,
    void: Vec<Arc<HandlerDescriptor>>,
}

/// 一次查找的结果：带返回值处理器（可选）与全部无返回值处理器
#[derive(Clone, Debug, Default)]
pub struct Handlers {
    pub returning: Option<Arc<HandlerDescriptor>>,
    pub void: Vec<Arc<HandlerDescriptor>>,
}

impl Handlers {
    pub fn is_empty(&self) -> bool {
        self.returning.is_none() && self.void.is_empty()
    }

    /// 处理器总数
    pub fn len(&self) -> usize {
        self.void.len() + usize::from(self.returning.is_some())
    }
}

#[derive(Default)]
pub struct InvokerRegistry {
    slots: DashMap<TypeId, HandlerSlot>,
}

impl InvokerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册处理器描述符
    ///
    /// 若同一事件类型已存在带返回值的处理器，再注册带返回值的处理器会返回
    /// `DispatchError::DuplicateHandler`，注册表保持不变。
    pub fn register(&self, descriptor: HandlerDescriptor) -> DispatchResult<()> {
        let event_type = descriptor.event_type();
        let descriptor = Arc::new(descriptor);

        let mut slot = match self.slots.entry(event_type.id()) {
            Entry::Occupied(o) => o.into_ref(),
            Entry::Vacant(v) => v.insert(HandlerSlot {
                event_name: event_type.name(),
                ..Default::default()
            }),
        };

        if descriptor.returns_value() {
            if let Some(existing) = &slot.returning {
                return Err(DispatchError::DuplicateHandler {
                    event: event_type.name(),
                    existing: existing.name().to_string(),
                    rejected: descriptor.name().to_string(),
                });
            }
            slot.returning = Some(descriptor);
        } else {
            slot.void.push(descriptor);
        }

        Ok(())
    }

    /// 查找带返回值的处理器
    pub fn find_return_value_handler(&self, event_type: EventType) -> Option<Arc<HandlerDescriptor>> {
        self.slots
            .get(&event_type.id())
            .and_then(|slot| slot.returning.clone())
    }

    /// 查找全部无返回值处理器（注册顺序）
    pub fn find_void_handlers(&self, event_type: EventType) -> Vec<Arc<HandlerDescriptor>> {
        self.slots
            .get(&event_type.id())
            .map(|slot| slot.void.clone())
            .unwrap_or_default()
    }

    /// 在同一把分片读锁下取出某事件类型的全部处理器
    pub fn lookup(&self, event_type: EventType) -> Handlers {
        self.slots
            .get(&event_type.id())
            .map(|slot| Handlers {
                returning: slot.returning.clone(),
                void: slot.void.clone(),
            })
            .unwrap_or_default()
    }

    /// 已注册的事件类型名列表（只读视图）
    pub fn registered_events(&self) -> Vec<&'static str> {
        self.slots.iter().map(|e| e.value().event_name).collect()
    }

    /// 已注册的处理器总数
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .map(|e| e.void.len() + usize::from(e.returning.is_some()))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
