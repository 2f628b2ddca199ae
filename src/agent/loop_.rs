//! 工具调用主循环
//!
//! 发送对话 + 系统提示词 + 工具目录 -> 模型回复中没有工具调用即完成；
//! 否则按顺序执行全部工具调用，结果按调用 id 配对回填，进入下一轮。
//! 到达迭代上限视为软完成。模型 API 失败立即返回错误，不在循环内重试。
//! 每次调用模型前检查取消标记。

use crate::llm::{ContentBlock, LlmClient, LlmError, Message, ModelRequest};
use crate::tools::{definitions, FileChange, ToolExecutor};

/// 单个请求的循环参数
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub model: String,
    pub system_prompt: String,
    pub max_tokens: u32,
    pub max_iterations: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// 模型给出不含工具调用的回复
    Finished { iterations: usize, final_text: String },
    /// 到达迭代上限
    MaxIterations { iterations: usize },
    /// 请求在执行中被取消
    Cancelled { iterations: usize },
}

#[derive(Debug, Clone)]
pub struct LoopReport {
    pub exit: LoopExit,
    /// 按发生顺序的文件变更
    pub changes: Vec<FileChange>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

pub struct AgentLoop<'a> {
    llm: &'a dyn LlmClient,
    tools: &'a ToolExecutor,
    settings: &'a LoopSettings,
}

impl<'a> AgentLoop<'a> {
    pub fn new(llm: &'a dyn LlmClient, tools: &'a ToolExecutor, settings: &'a LoopSettings) -> Self {
        Self {
            llm,
            tools,
            settings,
        }
    }

    pub async fn run(
        &self,
        user_message: String,
        is_cancelled: &(dyn Fn() -> bool + Send + Sync),
    ) -> Result<LoopReport, LlmError> {
        let catalog = definitions();
        let mut messages = vec![Message::user_text(user_message)];
        let mut changes = Vec::new();
        let mut input_tokens = 0u64;
        let mut output_tokens = 0u64;

        let report = |exit, changes, input_tokens, output_tokens| LoopReport {
            exit,
            changes,
            input_tokens,
            output_tokens,
        };

        for iteration in 1..=self.settings.max_iterations {
            if is_cancelled() {
                return Ok(report(
                    LoopExit::Cancelled {
                        iterations: iteration - 1,
                    },
                    changes,
                    input_tokens,
                    output_tokens,
                ));
            }

            let response = {
                let request = ModelRequest {
                    model: &self.settings.model,
                    system: &self.settings.system_prompt,
                    max_tokens: self.settings.max_tokens,
                    messages: &messages,
                    tools: &catalog,
                };
                self.llm.complete(&request).await?
            };
            input_tokens += response.usage.input_tokens;
            output_tokens += response.usage.output_tokens;

            let calls: Vec<(String, String, serde_json::Value)> = response
                .tool_uses()
                .into_iter()
                .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
                .collect();
            tracing::debug!(
                iteration,
                tool_calls = calls.len(),
                stop_reason = ?response.stop_reason,
                "Model turn"
            );

            if calls.is_empty() {
                return Ok(report(
                    LoopExit::Finished {
                        iterations: iteration,
                        final_text: response.text(),
                    },
                    changes,
                    input_tokens,
                    output_tokens,
                ));
            }

            let mut results = Vec::with_capacity(calls.len());
            for (id, name, input) in calls {
                let outcome = self.tools.execute(&name, &input).await;
                if let Some(change) = outcome.change {
                    changes.push(change);
                }
                results.push(ContentBlock::ToolResult {
                    tool_use_id: id,
                    content: outcome.content,
                    is_error: outcome.is_error,
                });
            }
            messages.push(Message::assistant(response.content));
            messages.push(Message::tool_results(results));
        }

        Ok(report(
            LoopExit::MaxIterations {
                iterations: self.settings.max_iterations,
            },
            changes,
            input_tokens,
            output_tokens,
        ))
    }
}
