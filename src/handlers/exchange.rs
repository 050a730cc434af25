//! 汇率任务：LLM 抽取两个 ISO 4217 代码，查询 ExchangeRate-API 兼容接口（`<key>/latest/<BASE>`）

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::{AgentError, TaskKind};
use crate::handlers::{DataProvider, FetchRequest, TaskHandler};
use crate::llm::LlmClient;

const CURRENCY_EXTRACTION_PROMPT: &str = r#"You are an assistant that extracts two currency codes (ISO 4217) from the given text.
Answer only with the two codes separated by a comma. No symbols, no explanations.

Example:
Text: "How much is a dollar in Mexican pesos?" -> USD, MXN
Text: "{text}""#;

const NO_CURRENCIES: &str = "No currencies detected in the message.";

pub struct ExchangeHandler {
    llm: Arc<dyn LlmClient>,
    provider: Arc<dyn DataProvider>,
    api_key: Option<String>,
}

impl ExchangeHandler {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        provider: Arc<dyn DataProvider>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            llm,
            provider,
            api_key,
        }
    }

    async fn extract_currencies(&self, text: &str) -> Result<(String, String), AgentError> {
        let prompt = CURRENCY_EXTRACTION_PROMPT.replace("{text}", text);
        tracing::debug!(prompt = %prompt, "currency extraction prompt");
        let raw = self.llm.infer(&prompt).await.map_err(|e| {
            tracing::warn!(error = %e, "currency extraction failed");
            AgentError::Extraction(NO_CURRENCIES.to_string())
        })?;
        parse_currency_pair(&raw).ok_or_else(|| {
            tracing::warn!(raw = %raw, "unexpected currency extraction format");
            AgentError::Extraction(NO_CURRENCIES.to_string())
        })
    }
}

/// "usd, mxn" -> ("USD", "MXN")；必须恰好两个 3 位字母代码
pub(crate) fn parse_currency_pair(raw: &str) -> Option<(String, String)> {
    let codes: Vec<String> = raw
        .split(',')
        .map(|p| p.trim().to_uppercase())
        .collect();
    match codes.as_slice() {
        [base, target]
            if [base, target]
                .iter()
                .all(|c| c.len() == 3 && c.chars().all(|ch| ch.is_ascii_alphabetic())) =>
        {
            Some((base.clone(), target.clone()))
        }
        _ => None,
    }
}

#[async_trait]
impl TaskHandler for ExchangeHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::Exchange
    }

    async fn handle(&self, request: &str) -> Result<String, AgentError> {
        let (base, target) = self.extract_currencies(request).await?;
        tracing::info!(base = %base, to = %target, "detected currencies");

        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| {
                AgentError::Provider("API Key not configured in the system.".to_string())
            })?;

        let resp = self
            .provider
            .fetch(FetchRequest::new(format!("{}/latest/{}", api_key, base)))
            .await?;

        if !resp.is_success() {
            tracing::error!(status = resp.status, "exchange API error");
            return Err(AgentError::Provider(format!("API error: {}", resp.status)));
        }

        let Value::Number(rate) = &resp.body["conversion_rates"][target.as_str()] else {
            tracing::warn!(to = %target, "rate not present in response");
            return Err(AgentError::Provider(format!("Exchange rate for {} not found.", target)));
        };

        let message = format!("1 {} = {} {}", base, rate, target);
        tracing::info!(message = %message, "exchange rate obtained");
        Ok(message)
    }
}
