//! 事件总线配置
//!
//! 可直接嵌入应用配置文件（serde 反序列化，缺省字段取默认值）。
//!
use serde::{Deserialize, Serialize};

/// 分发执行策略，在总线构建时选定
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// 查找、调用与回调均在调用方线程完成
    #[default]
    Synchronous,
    /// 查找在调用方线程完成（找不到处理器时同步返回错误），处理器调用交给工作池
    PerHandlerAsync,
    /// 整个分发（含查找）交给工作池，`publish` 立即返回
    FullPublishAsync,
}

impl DispatchMode {
    pub fn is_async(&self) -> bool {
        !matches!(self, Self::Synchronous)
    }
}

/// 多个处理器失败时的汇总方式
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// 只保留最后一个失败（按执行顺序）
    #[default]
    LastWins,
    /// 按执行顺序收集全部失败；多于一个时以 `DispatchError::Multiple` 返回
    CollectAll,
}

/// 事件总线配置
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    pub mode: DispatchMode,
    pub failure_policy: FailurePolicy,
    /// 工作池中同时执行的分发任务上限（异步模式）
    pub worker_threads: usize,
    /// 已提交但尚未完成的分发任务上限；超出时以 `Rejected` 完成回调
    pub max_pending: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            mode: DispatchMode::Synchronous,
            failure_policy: FailurePolicy::LastWins,
            worker_threads: 8,
            max_pending: 1024,
        }
    }
}
