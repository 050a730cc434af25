//! 错误恢复节点
//!
//! 每次只处理一条错误（error 中最早插入的那条）：让 LLM 把原始错误改写成面向用户的解释和替代建议，
//! 写入 `results[task]` 并移除该错误。LLM 失败时错误保留，由编排器计数；
//! 达到上限后用 [`ErrorRecoveryNode::force_resolve`] 给出确定性的兜底文本。

use std::sync::Arc;

use crate::core::{AgentError, AgentState, StateDelta, TaskKind, KEY_ERROR, NODE_RECOVERY};
use crate::llm::LlmClient;

fn recovery_prompt(text: &str, error: &str) -> String {
    format!(
        r#"You are an expert at interpreting errors from a system that looks up weather, news and currency exchange data.

Original user message:
"{text}"

System error message:
"{error}"

1. If there are abbreviated city, country or currency names (like 'UK', 'US', 'EUR'), spell them out in full.
2. Write a friendly explanation of the error for the user.
3. Suggest an alternative: for example, if the weather could not be retrieved, suggest asking for news or exchange rates instead, and invite the user to repeat the request with the suggested change.
Return only the final text for the user, without extra explanations or structure."#
    )
}

/// 一轮恢复的结果
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryStep {
    /// 错误已改写并移除
    Resolved { task: String, delta: StateDelta },
    /// 改写失败，错误仍在 error 中
    Failed {
        task: String,
        raw_error: String,
        reason: AgentError,
        delta: StateDelta,
    },
}

pub struct ErrorRecoveryNode {
    llm: Arc<dyn LlmClient>,
}

impl ErrorRecoveryNode {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// 处理最早的一条错误；没有错误时返回 None
    pub async fn recover(&self, state: &AgentState) -> Option<RecoveryStep> {
        let (task, raw_error) = state.error.first()?;
        let (task, raw_error) = (task.to_string(), raw_error.clone());
        tracing::info!(task = %task, error = %raw_error, "recovering from error");

        let prompt = recovery_prompt(state.last_user_message(), &raw_error);

        let explanation = match self.llm.infer(&prompt).await {
            Ok(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
            Ok(_) => Err("empty explanation".to_string()),
            Err(e) => Err(e.to_string()),
        };

        Some(match explanation {
            Ok(text) => {
                tracing::info!(task = %task, "error explained");
                RecoveryStep::Resolved {
                    delta: StateDelta::visited(NODE_RECOVERY)
                        .with_result(&task, vec![text])
                        .completed(&task, true)
                        .resolve_error(&task),
                    task,
                }
            }
            Err(reason) => {
                let reason = AgentError::Recovery {
                    task: task.clone(),
                    reason,
                };
                tracing::error!(error = %reason, "error recovery failed");
                RecoveryStep::Failed {
                    delta: StateDelta::visited(NODE_RECOVERY)
                        .with_result(
                            KEY_ERROR,
                            vec![format!(
                                "The error could not be processed automatically. Details: {reason}"
                            )],
                        )
                        .completed(KEY_ERROR, true),
                    task,
                    raw_error,
                    reason,
                }
            }
        })
    }

    /// 超过重试上限后的兜底：不调用 LLM，直接给出解释并移除错误
    pub fn force_resolve(task: &str) -> StateDelta {
        StateDelta::visited(NODE_RECOVERY)
            .with_result(task, vec![fallback_explanation(task)])
            .completed(task, true)
            .resolve_error(task)
    }
}

fn label(kind: TaskKind) -> &'static str {
    match kind {
        TaskKind::Weather => "the weather",
        TaskKind::Exchange => "currency exchange rates",
        TaskKind::News => "the latest news",
    }
}

/// 确定性的用户解释，附带其它任务作为替代建议；不包含原始错误文本
pub fn fallback_explanation(task: &str) -> String {
    match task.parse::<TaskKind>() {
        Ok(kind) => {
            let alternatives: Vec<&str> = TaskKind::ALL
                .into_iter()
                .filter(|k| *k != kind)
                .map(label)
                .collect();
            format!(
                "Sorry, I couldn't get {} for you right now. You can try again with more details, \
                 or ask me about {} instead.",
                label(kind),
                alternatives.join(" or ")
            )
        }
        Err(_) => "Sorry, something went wrong while processing your request. Please try again."
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, MockLlmClient};
    use crate::memory::{ConversationMemory, Message};

    fn failed_state(entries: &[(TaskKind, &str)]) -> AgentState {
        let mut conv = ConversationMemory::new(10);
        conv.push(Message::user("weather in Pariss and news for UK"));
        let mut state = AgentState::new(conv);
        for (kind, err) in entries {
            state.apply(StateDelta::task_failure(*kind, *err));
        }
        state
    }

    #[tokio::test]
    async fn test_resolves_oldest_error_only() {
        let llm = MockLlmClient::new()
            .on("interpreting errors", "Pariss doesn't look like a city. Try Paris!");
        let node = ErrorRecoveryNode::new(Arc::new(llm));
        let mut state = failed_state(&[
            (TaskKind::Weather, "City 'Pariss' not found or not correctly written in English."),
            (TaskKind::News, "No news found for uk."),
        ]);

        let Some(RecoveryStep::Resolved { task, delta }) = node.recover(&state).await else {
            panic!("expected resolved step");
        };
        assert_eq!(task, "weather");
        state.apply(delta);

        assert!(!state.error.contains_key("weather"));
        assert!(state.error.contains_key("news"));
        assert_eq!(
            state.results.get("weather"),
            Some(&vec!["Pariss doesn't look like a city. Try Paris!".to_string()])
        );
        assert_eq!(state.history.last().map(String::as_str), Some("task_error"));
    }

    #[tokio::test]
    async fn test_prompt_carries_error_and_request() {
        let llm = Arc::new(MockLlmClient::new().otherwise("explained"));
        let node = ErrorRecoveryNode::new(llm.clone());
        let state = failed_state(&[(TaskKind::News, "No news found for uk.")]);
        node.recover(&state).await;

        let prompt = &llm.calls()[0];
        assert!(prompt.contains("No news found for uk."));
        assert!(prompt.contains("news for UK"));
    }

    #[tokio::test]
    async fn test_placeholder_like_user_text_is_kept_verbatim() {
        let llm = Arc::new(MockLlmClient::new().otherwise("explained"));
        let node = ErrorRecoveryNode::new(llm.clone());
        let mut conv = ConversationMemory::new(10);
        conv.push(Message::user("news for {error} and {text}"));
        let mut state = AgentState::new(conv);
        state.apply(StateDelta::task_failure(TaskKind::News, "No news found for {text}."));
        node.recover(&state).await;

        let prompt = &llm.calls()[0];
        assert!(prompt.contains("\"news for {error} and {text}\""));
        assert!(prompt.contains("\"No news found for {text}.\""));
    }

    #[tokio::test]
    async fn test_failure_keeps_error() {
        let llm = MockLlmClient::new()
            .fail_on("interpreting errors", LlmError::Transport("503".into()));
        let node = ErrorRecoveryNode::new(Arc::new(llm));
        let mut state = failed_state(&[(TaskKind::Exchange, "API error: 500")]);

        let step = node.recover(&state).await;
        let Some(RecoveryStep::Failed { task, raw_error, delta, .. }) = step else {
            panic!("expected failed step");
        };
        assert_eq!(task, "exchange");
        assert_eq!(raw_error, "API error: 500");
        state.apply(delta);

        assert_eq!(state.error.get("exchange").map(String::as_str), Some("API error: 500"));
        let fallback = &state.results.get("error").unwrap()[0];
        assert!(fallback.starts_with("The error could not be processed"));
        assert!(state.results.get("exchange").is_none());
    }

    #[tokio::test]
    async fn test_no_error_no_step() {
        let node = ErrorRecoveryNode::new(Arc::new(MockLlmClient::new()));
        assert!(node.recover(&failed_state(&[])).await.is_none());
    }

    #[test]
    fn test_force_resolve_suggests_other_tasks() {
        let mut state = failed_state(&[(TaskKind::Weather, "Task 'weather' timed out")]);
        state.apply(ErrorRecoveryNode::force_resolve("weather"));

        assert!(state.error.is_empty());
        let text = &state.results.get("weather").unwrap()[0];
        assert!(!text.contains("Task 'weather' timed out"));
        assert!(text.contains("currency exchange rates or the latest news"));
    }

    #[test]
    fn test_fallback_for_non_task_key() {
        let text = fallback_explanation("order");
        assert!(text.starts_with("Sorry, something went wrong"));
        assert!(!text.contains("Error ordering tasks"));
    }
}
