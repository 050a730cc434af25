//! Orderer：按任务在原文中出现的先后给出展示顺序
//!
//! 排序失败不致命，写入 `error["order"]` 后照常派发；聚合时按任务名兜底排序。

use std::sync::Arc;

use crate::core::{AgentError, AgentState, StateDelta, TaskKind, TaskMap, KEY_ORDER, NODE_ORDER};
use crate::llm::{extract_json, LlmClient};

fn order_prompt(tasks: &str, text: &str) -> String {
    format!(
        r#"You coordinate a system that can fetch weather, news and currency exchange information.
The user asked for the following tasks: {tasks}.

Original user request:
"{text}"

Decide the order in which these tasks should be presented, following the order in which they appear in the text.
Return only a JSON object where each key is a task name and its value is its position (1, 2, 3...).
Omit tasks that were not requested.
For example: {{"weather": 1, "exchange": 2, "news": 3}}
Do not include any other text."#
    )
}

pub struct Orderer {
    llm: Arc<dyn LlmClient>,
}

impl Orderer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn order(&self, state: &AgentState) -> StateDelta {
        let requested = state.requested_tasks();
        if requested.is_empty() {
            tracing::info!("no tasks requested, skipping ordering");
            return StateDelta {
                order_task: Some(TaskMap::new()),
                ..StateDelta::visited(NODE_ORDER)
            }
            .completed(KEY_ORDER, true);
        }

        match self.rank(&requested, state.last_user_message()).await {
            Ok(order) => {
                tracing::info!(
                    order = %serde_json::to_string(&order).unwrap_or_default(),
                    "task order decided"
                );
                StateDelta {
                    order_task: Some(order),
                    ..StateDelta::visited(NODE_ORDER)
                }
                .completed(KEY_ORDER, true)
            }
            Err(e) => {
                let reason = match e {
                    AgentError::Ordering(reason) => reason,
                    other => other.to_string(),
                };
                let message = AgentError::Ordering(reason).to_string();
                tracing::warn!(error = %message, "ordering failed, falling back to name order");
                StateDelta::visited(NODE_ORDER)
                    .with_error(KEY_ORDER, message)
                    .completed(KEY_ORDER, false)
            }
        }
    }

    async fn rank(&self, requested: &[TaskKind], text: &str) -> Result<TaskMap<i64>, AgentError> {
        let names: Vec<&str> = requested.iter().map(|k| k.as_str()).collect();
        let prompt = order_prompt(&names.join(", "), text);

        let raw = self.llm.infer(&prompt).await?;
        let value = extract_json(&raw).map_err(AgentError::Ordering)?;
        let ranks = TaskMap::<i64>::from_json("order_task", &value)?;

        // 只保留本次请求的任务
        Ok(ranks
            .into_iter()
            .filter(|(name, _)| {
                let keep = names.contains(&name.as_str());
                if !keep {
                    tracing::warn!(task = %name, "ignoring rank for task that was not requested");
                }
                keep
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::memory::{ConversationMemory, Message};

    fn classified(text: &str, tasks: &[(&str, bool)]) -> AgentState {
        let mut conv = ConversationMemory::new(10);
        conv.push(Message::user(text));
        let mut state = AgentState::new(conv);
        state.apply(StateDelta {
            tasks_to_do: Some(tasks.iter().map(|(k, v)| (*k, *v)).collect()),
            ..StateDelta::default()
        });
        state
    }

    #[tokio::test]
    async fn test_order_follows_llm_ranks() {
        let llm = MockLlmClient::new()
            .on("Decide the order", r#"{"news": 1, "weather": 2, "exchange": 3}"#);
        let orderer = Orderer::new(Arc::new(llm));
        let mut s = classified(
            "news for France, then weather in Paris",
            &[("weather", true), ("exchange", false), ("news", true)],
        );
        s.apply(orderer.order(&s).await);

        let order: Vec<(&str, i64)> = s.order_task.iter().map(|(k, v)| (k, *v)).collect();
        assert_eq!(order, vec![("news", 1), ("weather", 2)]);
        assert_eq!(s.task_completed.get("order"), Some(&true));
        assert!(s.error.is_empty());
        assert_eq!(s.history, vec!["task_order"]);
    }

    #[tokio::test]
    async fn test_nothing_requested_skips_inference() {
        let llm = Arc::new(MockLlmClient::new());
        let orderer = Orderer::new(llm.clone());
        let mut s = classified("hi", &[("weather", false), ("exchange", false), ("news", false)]);
        s.apply(orderer.order(&s).await);
        assert!(s.order_task.is_empty());
        assert!(llm.calls().is_empty());
    }

    #[tokio::test]
    async fn test_user_text_with_braces_is_not_rewritten() {
        let llm = Arc::new(MockLlmClient::new().on("Decide the order", r#"{"news": 1}"#));
        let orderer = Orderer::new(llm.clone());
        let s = classified("news about {tasks} and {text}", &[("news", true)]);
        orderer.order(&s).await;

        let prompt = &llm.calls()[0];
        assert!(prompt.contains("\"news about {tasks} and {text}\""));
        assert!(prompt.contains("the following tasks: news."));
    }

    #[tokio::test]
    async fn test_malformed_ranks_are_non_fatal() {
        let llm = MockLlmClient::new().on("Decide the order", "first weather, then news");
        let orderer = Orderer::new(Arc::new(llm));
        let mut s = classified("weather and news", &[("weather", true), ("news", true)]);
        s.apply(orderer.order(&s).await);

        assert!(s.order_task.is_empty());
        assert!(s.error.get("order").unwrap().starts_with("Error ordering tasks:"));
        assert_eq!(s.task_completed.get("order"), Some(&false));
    }
}
