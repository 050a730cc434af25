//! 新闻任务：LLM 抽取国家代码（ISO 3166-1 alpha-2），查询 NewsAPI 兼容的 top-headlines 接口

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{AgentError, TaskKind};
use crate::handlers::{DataProvider, FetchRequest, TaskHandler};
use crate::llm::LlmClient;

const COUNTRY_EXTRACTION_PROMPT: &str = r#"You are an assistant that extracts the country (ISO 3166-1 alpha-2 code, like 'MX', 'US', 'FR') from the following text.
Respond only with the country code. If no country is mentioned, respond with ' '.

Text: "{text}""#;

const MAX_HEADLINES: usize = 3;

pub struct NewsHandler {
    llm: Arc<dyn LlmClient>,
    provider: Arc<dyn DataProvider>,
    api_key: Option<String>,
}

impl NewsHandler {
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

    async fn extract_country(&self, text: &str) -> Result<String, AgentError> {
        let prompt = COUNTRY_EXTRACTION_PROMPT.replace("{text}", text);
        tracing::debug!(prompt = %prompt, "country extraction prompt");
        let raw = self.llm.infer(&prompt).await.map_err(|e| {
            tracing::warn!(error = %e, "country extraction failed");
            AgentError::Extraction("Country could not be identified in the message.".to_string())
        })?;
        parse_country(&raw).ok_or_else(|| {
            tracing::warn!(raw = %raw, "invalid country code from extraction");
            AgentError::Extraction(format!(
                "Country could not be identified in the message (got '{}').",
                raw.trim()
            ))
        })
    }
}

/// 两位 ASCII 字母，统一小写
pub(crate) fn parse_country(raw: &str) -> Option<String> {
    let code = raw.trim().trim_matches(|c| c == '"' || c == '\'').trim().to_lowercase();
    (code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic())).then_some(code)
}

#[async_trait]
impl TaskHandler for NewsHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::News
    }

    async fn handle(&self, request: &str) -> Result<String, AgentError> {
        let country = self.extract_country(request).await?;
        tracing::info!(country = %country, "detected country code");

        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| {
                AgentError::Provider("API Key not configured in the system.".to_string())
            })?;

        let resp = self
            .provider
            .fetch(
                FetchRequest::new("")
                    .query("country", country.as_str())
                    .query("apiKey", api_key),
            )
            .await?;

        if !resp.is_success() {
            tracing::error!(status = resp.status, "news API error");
            return Err(AgentError::Provider(format!("Error in News API: {}", resp.status)));
        }

        let titles: Vec<&str> = resp.body["articles"]
            .as_array()
            .map(|articles| {
                articles
                    .iter()
                    .filter_map(|a| a["title"].as_str())
                    .take(MAX_HEADLINES)
                    .collect()
            })
            .unwrap_or_default();

        if titles.is_empty() {
            tracing::warn!(country = %country, "no articles returned");
            return Err(AgentError::Provider(format!("No news found for {}.", country)));
        }

        let headlines = format!("Headlines in {}: {}", country.to_uppercase(), titles.join(", "));
        tracing::info!(headlines = %headlines, "found headlines");
        Ok(headlines)
    }
}
