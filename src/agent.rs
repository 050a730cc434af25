//! Agent 运行时
//!
//! create_agent_components 按配置构建 LLM、三个数据源与 handler、执行器和编排器；
//! process_message 对单条用户输入跑一次编排，并把问答追加到调用方的对话窗口。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::{AgentError, AgentState, Orchestrator, Outcome, Reply, TaskKind, TaskScheduler};
use crate::handlers::{
    DataProvider, ExchangeHandler, HandlerExecutor, HandlerRegistry, HttpProvider, NewsHandler,
    WeatherHandler,
};
use crate::llm::{create_deepseek_client, LlmClient, MockLlmClient, OpenAiClient, TimeoutLlmClient};
use crate::memory::{ConversationMemory, Message};

/// 没有识别出任何任务时的回复
pub const NOTHING_TO_DO_REPLY: &str =
    "I can help with the weather, currency exchange rates and the latest news. Which of these would you like?";

/// 预构建的 Agent 组件，可多会话共享
pub struct AgentComponents {
    pub orchestrator: Orchestrator,
    pub max_context_turns: usize,
}

/// 每个任务的数据源及其 API Key
pub struct TaskSources {
    pub weather: (Arc<dyn DataProvider>, Option<String>),
    pub exchange: (Arc<dyn DataProvider>, Option<String>),
    pub news: (Arc<dyn DataProvider>, Option<String>),
}

impl TaskSources {
    /// 按配置创建 HTTP 数据源，Key 从环境变量读取
    pub fn from_config(cfg: &AppConfig) -> Self {
        let source = |kind: TaskKind| -> (Arc<dyn DataProvider>, Option<String>) {
            let endpoint = cfg.providers.endpoint(kind);
            let api_key = endpoint.api_key();
            if api_key.is_none() {
                tracing::warn!(task = %kind, env = %endpoint.api_key_env, "API key not set");
            }
            (
                Arc::new(HttpProvider::new(endpoint.base_url, endpoint.timeout_secs)),
                api_key,
            )
        };
        Self {
            weather: source(TaskKind::Weather),
            exchange: source(TaskKind::Exchange),
            news: source(TaskKind::News),
        }
    }
}

/// 根据配置与环境变量选择 LLM 后端（DeepSeek / OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let use_deepseek = std::env::var("DEEPSEEK_API_KEY").is_ok()
        || (provider == "deepseek" && std::env::var("OPENAI_API_KEY").is_ok());
    let use_openai = std::env::var("OPENAI_API_KEY").is_ok() && provider != "deepseek";

    if use_deepseek {
        let model = cfg
            .llm
            .deepseek
            .model
            .clone()
            .unwrap_or_else(|| cfg.llm.model.clone());
        tracing::info!("Using DeepSeek LLM ({})", model);
        Arc::new(create_deepseek_client(Some(&model)))
    } else if use_openai {
        let model = cfg
            .llm
            .openai
            .model
            .clone()
            .unwrap_or_else(|| "gpt-4o-mini".to_string());
        tracing::info!("Using OpenAI LLM ({})", model);
        Arc::new(OpenAiClient::new(
            cfg.llm.base_url.as_deref(),
            &model,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
        ))
    } else {
        tracing::warn!("No API key set or provider unknown, using Mock LLM");
        Arc::new(MockLlmClient::new())
    }
}

/// 用给定的 LLM 与数据源组装组件（测试时注入 Mock）
pub fn build_components(
    llm: Arc<dyn LlmClient>,
    sources: TaskSources,
    cfg: &AppConfig,
) -> AgentComponents {
    let mut registry = HandlerRegistry::new();
    let (provider, key) = sources.weather;
    registry.register(WeatherHandler::new(llm.clone(), provider, key));
    let (provider, key) = sources.exchange;
    registry.register(ExchangeHandler::new(llm.clone(), provider, key));
    let (provider, key) = sources.news;
    registry.register(NewsHandler::new(llm.clone(), provider, key));

    let executor = HandlerExecutor::new(registry, cfg.orchestrator.task_timeout_secs);
    let orchestrator = Orchestrator::new(llm, executor)
        .with_scheduler(TaskScheduler::new(cfg.orchestrator.max_concurrent_tasks))
        .with_max_recovery_attempts(cfg.orchestrator.max_recovery_attempts);

    AgentComponents {
        orchestrator,
        max_context_turns: cfg.app.max_context_turns,
    }
}

/// 创建 Agent 组件：LLM 调用统一加上 `llm.timeouts.request` 超时
pub fn create_agent_components(cfg: &AppConfig) -> AgentComponents {
    let llm: Arc<dyn LlmClient> = Arc::new(TimeoutLlmClient::new(
        create_llm_from_config(cfg),
        cfg.llm.timeouts.request,
    ));
    build_components(llm, TaskSources::from_config(cfg), cfg)
}

/// 处理单条用户消息
///
/// 成功时把用户消息与回复追加到 conversation；分类失败时追加的是 system 诊断消息。
/// 取消时 conversation 不变。
pub async fn process_message(
    components: &AgentComponents,
    conversation: &mut ConversationMemory,
    user_input: &str,
    cancel: &CancellationToken,
) -> Result<Reply, AgentError> {
    let mut window = conversation.clone();
    window.push(Message::user(user_input));

    let mut state = AgentState::new(window.clone());
    let mut reply = components.orchestrator.run(&mut state, cancel).await?;

    match &reply.outcome {
        Outcome::Aggregated => {
            if reply.response.is_empty() {
                reply.response.push(NOTHING_TO_DO_REPLY.to_string());
            }
            window.push(Message::assistant(reply.text()));
        }
        Outcome::ClassificationFailed(diagnostic) => {
            window.push(Message::system(diagnostic.clone()));
        }
    }

    *conversation = window;
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::StaticProvider;
    use crate::memory::Role;
    use serde_json::json;

    fn offline_sources() -> TaskSources {
        let provider: Arc<dyn DataProvider> = Arc::new(StaticProvider::ok(json!({})));
        TaskSources {
            weather: (provider.clone(), None),
            exchange: (provider.clone(), None),
            news: (provider, None),
        }
    }

    #[tokio::test]
    async fn test_nothing_requested_gets_canned_reply() {
        let llm = MockLlmClient::new()
            .on("You classify requests", r#"{"weather": false, "exchange": false, "news": false}"#);
        let components = build_components(Arc::new(llm), offline_sources(), &AppConfig::default());
        let mut conversation = ConversationMemory::new(5);

        let cancel = CancellationToken::new();
        let reply = process_message(&components, &mut conversation, "hello there", &cancel)
            .await
            .unwrap();

        assert_eq!(reply.response, vec![NOTHING_TO_DO_REPLY.to_string()]);
        let roles: Vec<Role> = conversation.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn test_classification_failure_records_diagnostic() {
        let components = build_components(
            Arc::new(MockLlmClient::new()),
            offline_sources(),
            &AppConfig::default(),
        );
        let mut conversation = ConversationMemory::new(5);

        let cancel = CancellationToken::new();
        let reply = process_message(&components, &mut conversation, "weather?", &cancel)
            .await
            .unwrap();

        assert!(matches!(reply.outcome, Outcome::ClassificationFailed(_)));
        let last = conversation.messages().last().unwrap();
        assert_eq!(last.role, Role::System);
        assert!(last.content.starts_with("classify:"));
    }

    #[tokio::test]
    async fn test_cancelled_request_leaves_conversation_untouched() {
        let components = build_components(
            Arc::new(MockLlmClient::new()),
            offline_sources(),
            &AppConfig::default(),
        );
        let mut conversation = ConversationMemory::new(5);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = process_message(&components, &mut conversation, "weather?", &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, AgentError::Cancelled);
        assert!(conversation.is_empty());
    }
}
