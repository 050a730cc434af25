//! Aggregator：按展示顺序拼接各任务结果，并让 LLM 改写成友好的文本
//!
//! 只聚合任务键（weather / exchange / news）且 results 非空的条目；
//! 有排名的按名次升序，没有排名的排在最后并按任务名排序。

use std::sync::Arc;

use crate::core::{AgentState, StateDelta, TaskKind, TaskMap, KEY_AGGREGATOR, NODE_AGGREGATOR};
use crate::llm::LlmClient;

const REWRITE_PROMPT: &str = r#"Rewrite the following message so it sounds friendly and is easy to read for the user.
Keep every fact. Return only the rewritten text.

Message: "{message}""#;

/// 聚合时的展示顺序
pub fn presentation_order(order: &TaskMap<i64>, results: &TaskMap<Vec<String>>) -> Vec<TaskKind> {
    let mut tasks: Vec<(Option<i64>, TaskKind)> = TaskKind::ALL
        .into_iter()
        .filter(|kind| results.get(kind.as_str()).is_some_and(|r| !r.is_empty()))
        .map(|kind| (order.get(kind.as_str()).copied(), kind))
        .collect();
    tasks.sort_by(|(ra, ka), (rb, kb)| {
        (ra.is_none(), ra, ka.as_str()).cmp(&(rb.is_none(), rb, kb.as_str()))
    });
    tasks.into_iter().map(|(_, kind)| kind).collect()
}

fn title(kind: TaskKind) -> String {
    let name = kind.as_str();
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub struct Aggregator {
    llm: Arc<dyn LlmClient>,
}

impl Aggregator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn aggregate(&self, state: &AgentState) -> StateDelta {
        if !state.error.is_empty() {
            tracing::warn!(pending = state.error.len(), "aggregating with unresolved errors");
        }

        let mut responses = Vec::new();
        for kind in presentation_order(&state.order_task, &state.results) {
            let Some(result) = state.results.get(kind.as_str()) else {
                continue;
            };
            let raw = format!("{}: {}", title(kind), result.join(" "));
            responses.push(self.rewrite(raw).await);
        }

        tracing::info!(count = responses.len(), "aggregated responses");
        StateDelta::visited(NODE_AGGREGATOR)
            .with_result(KEY_AGGREGATOR, responses)
            .completed(KEY_AGGREGATOR, true)
    }

    /// 改写失败或返回空文本时保留原文
    async fn rewrite(&self, raw: String) -> String {
        let prompt = REWRITE_PROMPT.replace("{message}", &raw);
        match self.llm.infer(&prompt).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                tracing::warn!("empty rewrite, keeping raw text");
                raw
            }
            Err(e) => {
                tracing::warn!(error = %e, "rewrite failed, keeping raw text");
                raw
            }
        }
    }
}
