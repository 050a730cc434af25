//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `CONCIERGE__*` 覆盖（双下划线表示嵌套，如 `CONCIERGE__LLM__PROVIDER=openai`）。
//! 数据源的 API Key 不写进配置文件，只记录环境变量名。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::TaskKind;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub providers: ProvidersSection,
    pub orchestrator: OrchestratorSection,
}

/// [app] 段：应用名、日志级别、对话轮数上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// RUST_LOG 未设置时使用
    pub log_level: String,
    /// 对话历史保留轮数
    pub max_context_turns: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            log_level: "info".to_string(),
            max_context_turns: 20,
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：deepseek / openai；优先级由 API Key 与 provider 共同决定
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub deepseek: LlmModelSection,
    pub openai: LlmModelSection,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            model: "deepseek-chat".to_string(),
            base_url: None,
            deepseek: LlmModelSection::default(),
            openai: LlmModelSection::default(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmModelSection {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次推理调用超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [providers.*] 段：各任务的数据源
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProvidersSection {
    pub weather: ProviderSection,
    pub exchange: ProviderSection,
    pub news: ProviderSection,
}

/// 单个数据源；未填写的字段按任务取默认值（见 [`ProvidersSection::endpoint`]）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderSection {
    pub base_url: Option<String>,
    /// 保存 API Key 的环境变量名
    pub api_key_env: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// 解析后的数据源配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoint {
    pub base_url: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl ProviderEndpoint {
    /// 从环境变量读取 API Key；未设置或为空时返回 None
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 15;

impl ProvidersSection {
    pub fn section(&self, kind: TaskKind) -> &ProviderSection {
        match kind {
            TaskKind::Weather => &self.weather,
            TaskKind::Exchange => &self.exchange,
            TaskKind::News => &self.news,
        }
    }

    pub fn endpoint(&self, kind: TaskKind) -> ProviderEndpoint {
        let (base_url, api_key_env) = match kind {
            TaskKind::Weather => (
                "https://api.openweathermap.org/data/2.5/weather",
                "OPENWEATHER_API_KEY",
            ),
            TaskKind::Exchange => ("https://v6.exchangerate-api.com/v6", "EXCHANGE_API_KEY"),
            TaskKind::News => ("https://newsapi.org/v2/top-headlines", "NEWS_API_KEY"),
        };
        let section = self.section(kind);
        ProviderEndpoint {
            base_url: section.base_url.clone().unwrap_or_else(|| base_url.to_string()),
            api_key_env: section
                .api_key_env
                .clone()
                .unwrap_or_else(|| api_key_env.to_string()),
            timeout_secs: section.timeout_secs.unwrap_or(DEFAULT_PROVIDER_TIMEOUT_SECS),
        }
    }
}

/// [orchestrator] 段：恢复上限、并发度、单任务超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    /// 每个任务的错误最多交给恢复节点失败几次
    pub max_recovery_attempts: u32,
    pub max_concurrent_tasks: usize,
    /// 单个 handler 调用的超时（秒）
    pub task_timeout_secs: u64,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_recovery_attempts: 2,
            max_concurrent_tasks: 3,
            task_timeout_secs: 45,
        }
    }
}

/// 从 config 目录加载配置，环境变量 CONCIERGE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 CONCIERGE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CONCIERGE")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
