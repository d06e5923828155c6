//! 事件总线统一错误定义
//!
//! 覆盖注册、查找、处理器调用与异步调度四类失败，
//! 处理器自身的失败以 `anyhow::Error` 形式携带在 `Invocation` 中。
//!
use thiserror::Error;

/// 分发错误
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DispatchError {
    // --- 注册/查找 ---
    #[error("handler not found: event={event}")]
    HandlerNotFound { event: &'static str },
    #[error("handler with return value already registered: event={event}, existing={existing}, rejected={rejected}")]
    DuplicateHandler {
        event: &'static str,
        existing: String,
        rejected: String,
    },

    // --- 调用 ---
    #[error("handler invocation failed: handler={handler}, event={event}, reason={source}")]
    Invocation {
        handler: String,
        event: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("{} handlers failed, last: {}", .0.len(), last_message(.0))]
    Multiple(Vec<DispatchError>),

    // --- 异步调度 ---
    #[error("dispatch rejected by worker pool: {reason}")]
    Rejected { reason: String },
    #[error("dispatch cancelled before it started")]
    Cancelled,
}

impl DispatchError {
    pub(crate) fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// 处理器调用失败时，返回处理器名称
    pub fn handler(&self) -> Option<&str> {
        match self {
            Self::Invocation { handler, .. } => Some(handler.as_str()),
            _ => None,
        }
    }
}

fn last_message(errors: &[DispatchError]) -> String {
    errors
        .last()
        .map(ToString::to_string)
        .unwrap_or_default()
}

/// 统一 Result 类型别名
pub type DispatchResult<T> = Result<T, DispatchError>;
