//! 处理器执行器
//!
//! 对每次 handler 调用施加超时，把 Result 映射为 StateDelta（成功写 results，失败写 error，两者都标记完成），
//! 并输出结构化审计日志（JSON）。生成的 future 是 'static 的，可以直接交给 TaskScheduler。

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinError;
use tokio::time::timeout;

use crate::core::{AgentError, StateDelta, TaskKind};
use crate::handlers::{HandlerRegistry, TaskHandler};

pub struct HandlerExecutor {
    registry: HandlerRegistry,
    timeout: Duration,
}

impl HandlerExecutor {
    pub fn new(registry: HandlerRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    pub fn with_timeout(registry: HandlerRegistry, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// 为 kind 构造一次执行；未注册的任务直接得到失败 delta
    pub fn job(
        &self,
        kind: TaskKind,
        request: String,
    ) -> impl Future<Output = StateDelta> + Send + 'static {
        let handler = self.registry.get(kind);
        let deadline = self.timeout;
        async move {
            match handler {
                Some(handler) => run_handler(handler, request, deadline).await,
                None => {
                    tracing::error!(task = %kind, "no handler registered");
                    StateDelta::task_failure(
                        kind,
                        format!("No handler registered for task '{kind}'."),
                    )
                }
            }
        }
    }
}

/// 执行单个 handler，永远返回 delta
pub async fn run_handler(
    handler: Arc<dyn TaskHandler>,
    request: String,
    deadline: Duration,
) -> StateDelta {
    let kind = handler.kind();
    let start = Instant::now();

    let result = match timeout(deadline, handler.handle(&request)).await {
        Ok(result) => result,
        Err(_) => Err(AgentError::Timeout(format!("Task '{kind}'"))),
    };

    let outcome = match &result {
        Ok(_) => "ok",
        Err(AgentError::Timeout(_)) => "timeout",
        Err(AgentError::Extraction(_)) => "extraction_failure",
        Err(_) => "provider_failure",
    };
    let audit = serde_json::json!({
        "event": "task_audit",
        "task": kind.as_str(),
        "ok": result.is_ok(),
        "outcome": outcome,
        "duration_ms": start.elapsed().as_millis() as u64,
    });
    tracing::info!(audit = %audit, "task");

    match result {
        Ok(message) => StateDelta::task_success(kind, message),
        Err(e) => StateDelta::task_failure(kind, e.to_string()),
    }
}

/// handler 所在的 tokio task 异常退出（panic / abort）时的兜底 delta
pub fn crashed(kind: TaskKind, err: &JoinError) -> StateDelta {
    tracing::error!(task = %kind, error = %err, "handler task crashed");
    StateDelta::task_failure(kind, format!("Unexpected error while running the {kind} task."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Fixed(TaskKind, Result<String, AgentError>);

    #[async_trait]
    impl TaskHandler for Fixed {
        fn kind(&self) -> TaskKind {
            self.0
        }

        async fn handle(&self, _request: &str) -> Result<String, AgentError> {
            self.1.clone()
        }
    }

    struct Stuck;

    #[async_trait]
    impl TaskHandler for Stuck {
        fn kind(&self) -> TaskKind {
            TaskKind::News
        }

        async fn handle(&self, _request: &str) -> Result<String, AgentError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("late".to_string())
        }
    }

    #[tokio::test]
    async fn test_success_becomes_result_delta() {
        let mut registry = HandlerRegistry::new();
        registry.register(Fixed(TaskKind::Weather, Ok("sunny".into())));
        let exec = HandlerExecutor::new(registry, 5);
        let delta = exec.job(TaskKind::Weather, "weather?".into()).await;
        assert_eq!(delta, StateDelta::task_success(TaskKind::Weather, "sunny"));
    }

    #[tokio::test]
    async fn test_failure_becomes_error_delta() {
        let mut registry = HandlerRegistry::new();
        registry.register(Fixed(
            TaskKind::Exchange,
            Err(AgentError::Provider("API error: 500".into())),
        ));
        let exec = HandlerExecutor::new(registry, 5);
        let delta = exec.job(TaskKind::Exchange, "usd?".into()).await;
        assert_eq!(delta.error.get("exchange"), Some(&"API error: 500".to_string()));
        assert_eq!(delta.task_completed.get("exchange"), Some(&true));
        assert_eq!(delta.history, vec!["task_exchange"]);
    }

    #[tokio::test]
    async fn test_timeout_is_terminal_failure() {
        let mut registry = HandlerRegistry::new();
        registry.register(Stuck);
        let exec = HandlerExecutor::with_timeout(registry, Duration::from_millis(20));
        let delta = exec.job(TaskKind::News, "news?".into()).await;
        assert_eq!(delta.error.get("news"), Some(&"Task 'news' timed out".to_string()));
    }

    #[tokio::test]
    async fn test_missing_handler() {
        let exec = HandlerExecutor::new(HandlerRegistry::new(), 5);
        let delta = exec.job(TaskKind::News, "news?".into()).await;
        assert!(delta.error.contains_key("news"));
        assert_eq!(delta.task_completed.get("news"), Some(&true));
    }
}
