//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient：输入消息列表，返回纯文本。
//! 调用方自行把文本解析为期望的结构，解析失败按抽取失败处理。

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Message;

/// 推理服务错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// 网络 / API 层失败
    #[error("inference transport error: {0}")]
    Transport(String),

    #[error("inference timed out after {0:?}")]
    Timeout(Duration),

    #[error("inference returned an empty response")]
    EmptyResponse,
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 单条 prompt 的便捷入口（等价于 infer(prompt) -> text）
    async fn infer(&self, prompt: &str) -> Result<String, LlmError> {
        self.complete(&[Message::user(prompt)]).await
    }
}
