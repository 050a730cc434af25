//! 任务处理器注册表
//!
//! 每种 TaskKind 对应一个 TaskHandler；Router 只通过注册表按类型查找，不关心具体实现。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{AgentError, TaskKind};

/// 任务处理器：抽取实体 → 调用数据源 → 返回格式化结果
///
/// 失败一律以 Err 返回，由 HandlerExecutor 转成 `error[task]`。
#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn kind(&self) -> TaskKind;

    async fn handle(&self, request: &str) -> Result<String, AgentError>;
}

#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskKind, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: impl TaskHandler + 'static) {
        self.register_arc(Arc::new(handler));
    }

    pub fn register_arc(&mut self, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    pub fn get(&self, kind: TaskKind) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(&kind).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(TaskKind, &'static str);

    #[async_trait]
    impl TaskHandler for Fixed {
        fn kind(&self) -> TaskKind {
            self.0
        }

        async fn handle(&self, _request: &str) -> Result<String, AgentError> {
            Ok(self.1.to_string())
        }
    }

    #[tokio::test]
    async fn test_lookup_by_kind_and_replace() {
        let mut registry = HandlerRegistry::new();
        registry.register(Fixed(TaskKind::News, "old"));
        registry.register(Fixed(TaskKind::News, "new"));

        assert!(registry.get(TaskKind::Weather).is_none());
        let news = registry.get(TaskKind::News).unwrap();
        assert_eq!(news.handle("news").await.unwrap(), "new");
    }
}
