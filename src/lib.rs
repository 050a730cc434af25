//! Concierge - 多任务请求编排
//!
//! 一条用户消息里可能同时包含天气、汇率、新闻三类请求：先分类、再排序，
//! 并发执行各任务，逐条恢复失败任务，最后按展示顺序聚合成回复。
//!
//! 模块划分：
//! - **agent**: 组件装配与单条消息处理入口
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 状态、有序映射、任务调度、错误恢复与主控循环
//! - **handlers**: 天气 / 汇率 / 新闻处理器与数据源抽象
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 有界对话窗口
//! - **nodes**: 分类、排序、聚合节点
//! - **observability**: tracing 初始化

pub mod agent;
pub mod config;
pub mod core;
pub mod handlers;
pub mod llm;
pub mod memory;
pub mod nodes;
pub mod observability;

pub use agent::{create_agent_components, process_message, AgentComponents};
pub use core::{AgentError, Orchestrator, Reply};
