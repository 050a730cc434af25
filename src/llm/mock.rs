//! Mock LLM 客户端（用于测试与无 API Key 的本地运行）
//!
//! 按规则回放：把所有消息内容拼成 prompt，第一条「所有关键字都命中」的规则决定回复；
//! 都不命中时使用 fallback（默认返回 Transport 错误）。所有 prompt 会被记录，便于断言调用次数。

use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::Message;

/// 规则命中后的回复
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Fail(LlmError),
}

#[derive(Debug)]
struct Rule {
    needles: Vec<String>,
    reply: MockReply,
}

/// 规则驱动的 Mock 客户端
#[derive(Debug)]
pub struct MockLlmClient {
    rules: Vec<Rule>,
    fallback: MockReply,
    calls: Mutex<Vec<String>>,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            fallback: MockReply::Fail(LlmError::Transport(
                "no LLM backend configured".to_string(),
            )),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// prompt 包含 needle 时回复 text
    pub fn on(self, needle: &str, text: impl Into<String>) -> Self {
        self.on_all(&[needle], text)
    }

    /// prompt 同时包含所有 needles 时回复 text
    pub fn on_all(mut self, needles: &[&str], text: impl Into<String>) -> Self {
        self.rules.push(Rule {
            needles: needles.iter().map(|s| s.to_string()).collect(),
            reply: MockReply::Text(text.into()),
        });
        self
    }

    /// prompt 包含 needle 时返回错误
    pub fn fail_on(mut self, needle: &str, err: LlmError) -> Self {
        self.rules.push(Rule {
            needles: vec![needle.to_string()],
            reply: MockReply::Fail(err),
        });
        self
    }

    /// 无规则命中时的回复
    pub fn otherwise(mut self, text: impl Into<String>) -> Self {
        self.fallback = MockReply::Text(text.into());
        self
    }

    /// 已收到的全部 prompt（按调用顺序）
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn calls_containing(&self, needle: &str) -> usize {
        self.calls().iter().filter(|p| p.contains(needle)).count()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let prompt = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        if let Ok(mut calls) = self.calls.lock() {
            calls.push(prompt.clone());
        }

        let reply = self
            .rules
            .iter()
            .find(|r| r.needles.iter().all(|n| prompt.contains(n.as_str())))
            .map(|r| &r.reply)
            .unwrap_or(&self.fallback);

        match reply {
            MockReply::Text(t) => Ok(t.clone()),
            MockReply::Fail(e) => Err(e.clone()),
        }
    }
}
