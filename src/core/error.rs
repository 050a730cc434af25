//! 错误类型
//!
//! Handler 永远不把错误抛出边界：AgentError 在执行器里被转成 `error[task]` 条目，
//! Router 只看 error 映射做决策。只有 Classification 会让整个请求短路。

use thiserror::Error;

use crate::llm::LlmError;

/// 状态合并错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// reducer 收到的更新不是映射（或值类型不符）
    #[error("malformed update for '{field}': {reason}")]
    MalformedUpdate { field: String, reason: String },
}

impl StateError {
    pub fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedUpdate {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 请求处理过程中的错误分类
///
/// Extraction / Provider / Timeout 的 Display 就是写入 `error[task]` 的原始文本。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    /// 推理服务给出的实体无法使用
    #[error("{0}")]
    Extraction(String),

    /// 数据源返回非成功状态或缺字段
    #[error("{0}")]
    Provider(String),

    #[error("{0} timed out")]
    Timeout(String),

    /// 致命：本次请求不再派发任何任务
    #[error("classify: {0}")]
    Classification(String),

    /// 非致命：退化为默认顺序
    #[error("Error ordering tasks: {0}")]
    Ordering(String),

    /// 恢复节点自身失败，原始错误保留到下一轮
    #[error("recovery failed for '{task}': {reason}")]
    Recovery { task: String, reason: String },

    #[error(transparent)]
    Inference(#[from] LlmError),

    #[error(transparent)]
    MalformedUpdate(#[from] StateError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Request cancelled")]
    Cancelled,
}
