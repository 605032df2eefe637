//! likebot-llm: one-shot LLM completions for chat replies.

pub mod provider;
pub mod reply;

pub use provider::{provider_from_config, ChatMessage, LlmProvider, OpenAiCompatible};
pub use reply::{ReplyComposer, ReplyKind, ReplyStyles};
