//! 工具执行器
//!
//! 绑定一个检出目录（Sandbox）与一个请求的 RunLog。execute(name, input) 解析为 ToolCall，
//! 在超时内于阻塞线程池执行文件操作，结果一律转成文本；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::request::RunLog;
use crate::tools::{edit_file, list_files, read_file, write_file, Sandbox, ToolCall, ToolError};

/// 一次修改检出目录的调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub tool: String,
    pub path: String,
}

/// 工具调用结果：回填给模型的文本 + 是否出错 + 文件变更
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub content: String,
    pub is_error: bool,
    pub change: Option<FileChange>,
}

pub struct ToolExecutor {
    sandbox: Sandbox,
    timeout: Duration,
    log: RunLog,
}

impl ToolExecutor {
    pub fn new(sandbox: Sandbox, timeout: Duration, log: RunLog) -> Self {
        Self {
            sandbox,
            timeout,
            log,
        }
    }

    /// 执行指定工具；任何失败都以 `Error: ...` 文本返回，不会向上抛出
    pub async fn execute(&self, tool_name: &str, input: &Value) -> ToolOutcome {
        let start = Instant::now();
        let (result, change) = match ToolCall::parse(tool_name, input) {
            Ok(call) => self.run(call).await,
            Err(e) => (Err(e), None),
        };

        let outcome: &str = match &result {
            Ok(_) => "ok",
            Err(ToolError::Timeout(..)) => "timeout",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "request_id": self.log.request_id(),
            "tool": tool_name,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(input),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(content) => ToolOutcome {
                content,
                is_error: false,
                change,
            },
            Err(e) => ToolOutcome {
                content: e.render(),
                is_error: true,
                change,
            },
        }
    }

    /// 返回 (结果, 文件变更)。写入类工具超时后阻塞线程仍可能完成写入，
    /// 此时照样记录变更，保证后续发布不会漏掉磁盘上的修改。
    async fn run(&self, call: ToolCall) -> (Result<String, ToolError>, Option<FileChange>) {
        if let ToolCall::LogProgress { message, level } = &call {
            self.log.log(*level, message);
            return (Ok("Logged successfully".to_string()), None);
        }

        let name = call.name();
        let change = call.mutated_path().map(|path| FileChange {
            tool: name.to_string(),
            path: path.to_string(),
        });
        let sandbox = self.sandbox.clone();
        let task = tokio::task::spawn_blocking(move || dispatch(&sandbox, call));
        let content = match timeout(self.timeout, task).await {
            Ok(Ok(Ok(content))) => content,
            Ok(Ok(Err(e))) => return (Err(e), None),
            Ok(Err(join_err)) => return (Err(ToolError::io(name, join_err)), None),
            Err(_) => {
                if let Some(change) = &change {
                    self.log.warning(format!(
                        "{} timed out on {}; the change may still be applied",
                        name, change.path
                    ));
                }
                return (
                    Err(ToolError::Timeout(name.to_string(), self.timeout.as_secs())),
                    change,
                );
            }
        };

        if let Some(change) = &change {
            let verb = if change.tool == crate::tools::catalog::WRITE_FILE {
                "Wrote file"
            } else {
                "Edited file"
            };
            self.log.info(format!("{}: {}", verb, change.path));
        }
        (Ok(content), change)
    }
}

fn dispatch(sandbox: &Sandbox, call: ToolCall) -> Result<String, ToolError> {
    match call {
        ToolCall::ReadFile { path } => read_file::read_file(sandbox, &path),
        ToolCall::WriteFile { path, content } => write_file::write_file(sandbox, &path, &content),
        ToolCall::EditFile {
            path,
            old_string,
            new_string,
        } => edit_file::edit_file(sandbox, &path, &old_string, &new_string),
        ToolCall::ListFiles { pattern } => list_files::list_files(sandbox, &pattern),
        ToolCall::LogProgress { .. } => Ok("Logged successfully".to_string()),
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
