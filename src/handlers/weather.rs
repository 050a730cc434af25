//! 天气任务：LLM 抽取城市名（美式英文），查询 OpenWeatherMap 兼容接口

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{AgentError, TaskKind};
use crate::handlers::{DataProvider, FetchRequest, TaskHandler};
use crate::llm::LlmClient;

const CITY_EXTRACTION_PROMPT: &str = r#"You are an assistant that extracts the city name, in American English, from the text below.
Answer with the city name only, without quotes or extra symbols.

Example:
Text: "How is the weather in Nueva York?" -> New York
Text: "{text}""#;

const CITY_NOT_IDENTIFIED: &str = "City could not be identified in the message.";

pub struct WeatherHandler {
    llm: Arc<dyn LlmClient>,
    provider: Arc<dyn DataProvider>,
    api_key: Option<String>,
}

impl WeatherHandler {
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

    async fn extract_city(&self, text: &str) -> Result<String, AgentError> {
        let prompt = CITY_EXTRACTION_PROMPT.replace("{text}", text);
        tracing::debug!(prompt = %prompt, "city extraction prompt");
        let raw = self.llm.infer(&prompt).await.map_err(|e| {
            tracing::warn!(error = %e, "city extraction failed");
            AgentError::Extraction(CITY_NOT_IDENTIFIED.to_string())
        })?;
        parse_city(&raw).ok_or_else(|| {
            tracing::warn!(raw = %raw, "invalid city in extraction response");
            AgentError::Extraction(CITY_NOT_IDENTIFIED.to_string())
        })
    }
}

/// 城市名校验：至少 2 个字符，不含 JSON 括号
pub(crate) fn parse_city(raw: &str) -> Option<String> {
    let city = raw.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    if city.chars().count() < 2 || city.contains(['{', '}', '[', ']']) {
        return None;
    }
    Some(city.to_string())
}

#[async_trait]
impl TaskHandler for WeatherHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::Weather
    }

    async fn handle(&self, request: &str) -> Result<String, AgentError> {
        let city = self.extract_city(request).await?;
        tracing::info!(city = %city, "fetching weather");

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
                    .query("q", city.as_str())
                    .query("appid", api_key)
                    .query("units", "metric"),
            )
            .await?;

        if !resp.is_success() {
            tracing::warn!(status = resp.status, city = %city, "weather lookup failed");
            return Err(AgentError::Provider(format!(
                "City '{}' not found or not correctly written in English.",
                city
            )));
        }

        let description = resp.body["weather"][0]["description"].as_str();
        let temperature = resp.body["main"]["temp"].as_f64();
        let (Some(description), Some(temperature)) = (description, temperature) else {
            return Err(AgentError::Provider(
                "Unexpected weather data format received from API.".to_string(),
            ));
        };

        let report = format!(
            "The weather in {} is {} with a temperature of {}°C.",
            city, description, temperature
        );
        tracing::info!(report = %report, "weather report");
        Ok(report)
    }
}
