//! 记忆层：有界对话窗口

pub mod conversation;

pub use conversation::{ConversationMemory, Message, Role};
