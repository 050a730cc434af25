//! 单次推理超时
//!
//! 包装任意 LlmClient，每次 complete 在 deadline 内完成，否则返回 LlmError::Timeout。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use crate::llm::{LlmClient, LlmError};
use crate::memory::Message;

pub struct TimeoutLlmClient {
    inner: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl TimeoutLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, timeout_secs: u64) -> Self {
        Self {
            inner,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    pub fn with_duration(inner: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl LlmClient for TimeoutLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        match timeout(self.timeout, self.inner.complete(messages)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "inference call timed out"
                );
                Err(LlmError::Timeout(self.timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowClient;

    #[async_trait]
    impl LlmClient for SlowClient {
        async fn complete(&self, _messages: &[Message]) -> Result<String, LlmError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let client =
            TimeoutLlmClient::with_duration(Arc::new(SlowClient), Duration::from_millis(20));
        let err = client.infer("hi").await.unwrap_err();
        assert!(matches!(err, LlmError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_fast_call_passes_through() {
        let inner = Arc::new(crate::llm::MockLlmClient::new().otherwise("ok"));
        let client = TimeoutLlmClient::new(inner, 5);
        assert_eq!(client.infer("hi").await.unwrap(), "ok");
    }
}
