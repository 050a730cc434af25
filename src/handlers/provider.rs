//! 数据源：fetch(params) -> (status, json)
//!
//! HttpProvider 用 reqwest 请求真实 API（客户端级超时）；StaticProvider 返回固定响应，供测试与离线运行。
//! 非 2xx 状态不算错误，交给 handler 按各自语义解释；只有网络层失败才返回 Err。

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::core::AgentError;

/// 一次数据源请求：相对路径 + 查询参数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRequest {
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn get_query(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    pub status: u16,
    pub body: Value,
}

impl ProviderResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait DataProvider: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<ProviderResponse, AgentError>;
}

/// HTTP 数据源：base_url + path，GET 带查询参数
pub struct HttpProvider {
    client: Client,
    base_url: String,
}

impl HttpProvider {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .user_agent(concat!("concierge/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base, path)
        }
    }
}

#[async_trait]
impl DataProvider for HttpProvider {
    async fn fetch(&self, request: FetchRequest) -> Result<ProviderResponse, AgentError> {
        let url = self.url(&request.path);
        // 查询参数里有 API Key，只记录 base_url
        tracing::debug!(base_url = %self.base_url, "provider fetch");

        let resp = self
            .client
            .get(&url)
            .query(&request.query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AgentError::Timeout(format!("Request to {}", self.base_url))
                } else {
                    AgentError::Provider(format!("Request failed: {}", e.without_url()))
                }
            })?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| AgentError::Provider(format!("Read body: {}", e.without_url())))?;
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);

        Ok(ProviderResponse { status, body })
    }
}

/// 固定响应的数据源，同时记录收到的请求
pub struct StaticProvider {
    response: Result<ProviderResponse, AgentError>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl StaticProvider {
    pub fn ok(body: Value) -> Self {
        Self::with_status(200, body)
    }

    pub fn with_status(status: u16, body: Value) -> Self {
        Self {
            response: Ok(ProviderResponse { status, body }),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(err: AgentError) -> Self {
        Self {
            response: Err(err),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl DataProvider for StaticProvider {
    async fn fetch(&self, request: FetchRequest) -> Result<ProviderResponse, AgentError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        self.response.clone()
    }
}
