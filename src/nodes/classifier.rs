//! Classifier：判断请求中包含哪些任务
//!
//! 输出 `{weather, exchange, news} -> bool`，并对本次运行的状态做完整重置。
//! 解析失败是致命的：写入 `error["classify"]`，追加一条 system 诊断消息，不派发任何任务。

use std::sync::Arc;

use crate::core::{
    AgentError, AgentState, StateDelta, TaskKind, TaskMap, KEY_CLASSIFY, NODE_CLASSIFY,
};
use crate::llm::{extract_json, LlmClient};
use crate::memory::Message;

const CLASSIFY_PROMPT: &str = r#"You classify requests into three task categories: weather, exchange and news.
Given the user's message, answer with a JSON object with the keys "weather", "exchange", "news"
and boolean values indicating whether each task is present.
Example answer: {"weather": true, "exchange": false, "news": true}"#;

pub struct Classifier {
    llm: Arc<dyn LlmClient>,
}

impl Classifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn classify(&self, state: &AgentState) -> StateDelta {
        let text = state.last_user_message();
        tracing::info!(message = %text, "classifying request");

        match self.try_classify(text).await {
            Ok(tasks) => {
                tracing::info!(
                    tasks = %serde_json::to_string(&tasks).unwrap_or_default(),
                    "tasks classified"
                );
                StateDelta {
                    reset: true,
                    tasks_to_do: Some(tasks),
                    history: vec![NODE_CLASSIFY.to_string()],
                    ..StateDelta::default()
                }
            }
            Err(e) => {
                let reason = match e {
                    AgentError::Classification(reason) => reason,
                    other => other.to_string(),
                };
                let diagnostic = AgentError::Classification(reason).to_string();
                tracing::error!(error = %diagnostic, "classification failed");
                StateDelta {
                    reset: true,
                    tasks_to_do: Some(TaskMap::new()),
                    history: vec![NODE_CLASSIFY.to_string()],
                    ..StateDelta::default()
                }
                .with_error(KEY_CLASSIFY, diagnostic.clone())
                .with_message(Message::system(diagnostic))
            }
        }
    }

    async fn try_classify(&self, text: &str) -> Result<TaskMap<bool>, AgentError> {
        if text.trim().is_empty() {
            return Err(AgentError::Classification("no user message to classify".to_string()));
        }

        let messages = [Message::system(CLASSIFY_PROMPT), Message::user(text)];
        let raw = self.llm.complete(&messages).await?;
        tracing::debug!(raw = %raw, "classifier response");

        let value = extract_json(&raw).map_err(AgentError::Classification)?;
        let parsed = TaskMap::<bool>::from_json("tasks_to_do", &value)?;

        for key in parsed.keys() {
            if key.parse::<TaskKind>().is_err() {
                tracing::warn!(key = %key, "ignoring unknown task in classification");
            }
        }

        Ok(TaskKind::ALL
            .iter()
            .map(|kind| (kind.as_str(), parsed.get(kind.as_str()).copied().unwrap_or(false)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::memory::ConversationMemory;

    fn state(text: &str) -> AgentState {
        let mut conv = ConversationMemory::new(10);
        conv.push(Message::user(text));
        AgentState::new(conv)
    }

    #[tokio::test]
    async fn test_classification_fills_closed_set() {
        let llm = MockLlmClient::new().on(
            "You classify requests",
            r#"{"weather": true, "news": true, "sports": true}"#,
        );
        let classifier = Classifier::new(Arc::new(llm));
        let mut s = state("weather in Paris and news for France");
        s.apply(classifier.classify(&s).await);

        assert_eq!(s.tasks_to_do.get("weather"), Some(&true));
        assert_eq!(s.tasks_to_do.get("exchange"), Some(&false));
        assert_eq!(s.tasks_to_do.get("news"), Some(&true));
        assert!(!s.tasks_to_do.contains_key("sports"));
        assert!(s.error.is_empty());
        assert_eq!(s.history, vec!["classify_tasks"]);
    }

    #[tokio::test]
    async fn test_unparseable_response_is_fatal() {
        let llm = MockLlmClient::new().on("You classify requests", "Sorry, I can't do that.");
        let classifier = Classifier::new(Arc::new(llm));
        let mut s = state("hello");
        s.results.insert("weather", vec!["stale".into()]);
        s.apply(classifier.classify(&s).await);

        assert!(s.tasks_to_do.is_empty());
        assert!(s.results.is_empty());
        let diagnostic = s.error.get("classify").cloned().unwrap();
        assert!(diagnostic.starts_with("classify:"));
        assert_eq!(s.messages.messages().last().unwrap(), &Message::system(diagnostic));
    }

    #[tokio::test]
    async fn test_non_boolean_values_rejected() {
        let llm = MockLlmClient::new().on("You classify requests", r#"{"weather": "yes"}"#);
        let classifier = Classifier::new(Arc::new(llm));
        let mut s = state("weather?");
        s.apply(classifier.classify(&s).await);
        assert!(s.error.get("classify").unwrap().contains("malformed update"));
    }

    #[tokio::test]
    async fn test_inference_failure_is_fatal() {
        let classifier = Classifier::new(Arc::new(MockLlmClient::new()));
        let mut s = state("weather?");
        s.apply(classifier.classify(&s).await);
        assert!(s.error.contains_key("classify"));
        assert!(s.tasks_to_do.is_empty());
    }
}
