//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）、超时包装、JSON 提取

pub mod deepseek;
pub mod json;
pub mod mock;
pub mod openai;
pub mod timeout;
pub mod traits;

pub use deepseek::{create_deepseek_client, DEEPSEEK_CHAT};
pub use json::extract_json;
pub use mock::{MockLlmClient, MockReply};
pub use openai::OpenAiClient;
pub use timeout::TimeoutLlmClient;
pub use traits::{LlmClient, LlmError};
