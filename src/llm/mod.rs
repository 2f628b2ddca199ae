//! LLM 层：客户端抽象与实现（Anthropic Messages / 脚本化 Mock）

pub mod anthropic;
pub mod mock;
pub mod traits;

pub use anthropic::AnthropicClient;
pub use mock::ScriptedLlmClient;
pub use traits::{
    ContentBlock, LlmClient, LlmError, Message, ModelRequest, ModelResponse, Role, TokenUsage,
    ToolDefinition, Usage,
};
