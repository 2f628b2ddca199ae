//! 脚本化 LLM 客户端（用于测试，无需 API）
//!
//! 按顺序弹出预置的回复；脚本耗尽后使用 fallback（未设置则返回 InvalidResponse）。
//! 每次调用的消息快照都会记录下来，便于断言对话内容。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{
    ContentBlock, LlmClient, LlmError, Message, ModelRequest, ModelResponse, TokenUsage, Usage,
};

/// 记录下来的一次调用
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub system: String,
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
}

#[derive(Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<ModelResponse, LlmError>>>,
    fallback: Option<Result<ModelResponse, LlmError>>,
    calls: Mutex<Vec<RecordedCall>>,
    usage: TokenUsage,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, response: ModelResponse) -> Self {
        self.push(Ok(response));
        self
    }

    pub fn then_error(self, error: LlmError) -> Self {
        self.push(Err(error));
        self
    }

    /// 脚本耗尽后每次都返回该回复
    pub fn with_fallback(mut self, response: ModelResponse) -> Self {
        self.fallback = Some(Ok(response));
        self
    }

    fn push(&self, item: Result<ModelResponse, LlmError>) {
        self.script
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(item);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// 纯文本回复（无工具调用，即完成信号）
    pub fn text_reply(text: &str) -> ModelResponse {
        ModelResponse {
            content: vec![ContentBlock::Text { text: text.into() }],
            stop_reason: Some("end_turn".into()),
            usage: Usage {
                input_tokens: 10,
                output_tokens: 5,
            },
        }
    }

    /// 工具调用回复：(id, name, input)
    pub fn tool_reply(calls: Vec<(&str, &str, Value)>) -> ModelResponse {
        ModelResponse {
            content: calls
                .into_iter()
                .map(|(id, name, input)| ContentBlock::ToolUse {
                    id: id.into(),
                    name: name.into(),
                    input,
                })
                .collect(),
            stop_reason: Some("tool_use".into()),
            usage: Usage {
                input_tokens: 10,
                output_tokens: 5,
            },
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, request: &ModelRequest<'_>) -> Result<ModelResponse, LlmError> {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(RecordedCall {
                model: request.model.to_string(),
                system: request.system.to_string(),
                messages: request.messages.to_vec(),
                tool_names: request.tools.iter().map(|t| t.name.clone()).collect(),
            });

        let next = self
            .script
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front();
        let result = match next {
            Some(item) => item,
            None => self
                .fallback
                .clone()
                .unwrap_or_else(|| Err(LlmError::InvalidResponse("script exhausted".into()))),
        };
        if let Ok(resp) = &result {
            self.usage.add(resp.usage);
        }
        result
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }
}
