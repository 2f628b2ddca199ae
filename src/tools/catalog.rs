//! 工具目录
//!
//! 模型侧的 (name, input) 在边界处解析为封闭的 ToolCall 枚举；未知工具名或参数不合法
//! 在解析时就变成 ToolError，分发处按变体穷尽匹配。

use serde::Deserialize;
use serde_json::{json, Value};

use crate::llm::ToolDefinition;
use crate::request::LogLevel;
use crate::tools::ToolError;

pub const READ_FILE: &str = "read_file";
pub const WRITE_FILE: &str = "write_file";
pub const EDIT_FILE: &str = "edit_file";
pub const LIST_FILES: &str = "list_files";
pub const LOG_PROGRESS: &str = "log_progress";

#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    ReadFile {
        path: String,
    },
    WriteFile {
        path: String,
        content: String,
    },
    EditFile {
        path: String,
        old_string: String,
        new_string: String,
    },
    ListFiles {
        pattern: String,
    },
    LogProgress {
        message: String,
        level: LogLevel,
    },
}

#[derive(Deserialize)]
struct PathArgs {
    path: String,
}

#[derive(Deserialize)]
struct WriteArgs {
    path: String,
    content: String,
}

#[derive(Deserialize)]
struct EditArgs {
    path: String,
    old_string: String,
    new_string: String,
}

#[derive(Deserialize)]
struct PatternArgs {
    pattern: String,
}

#[derive(Deserialize)]
struct LogArgs {
    message: String,
    #[serde(default)]
    level: Option<String>,
}

fn args<T: for<'de> Deserialize<'de>>(tool: &str, input: &Value) -> Result<T, ToolError> {
    serde_json::from_value(input.clone()).map_err(|e| ToolError::InvalidInput {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

impl ToolCall {
    pub fn parse(name: &str, input: &Value) -> Result<Self, ToolError> {
        let call = match name {
            READ_FILE => {
                let a: PathArgs = args(name, input)?;
                Self::ReadFile { path: a.path }
            }
            WRITE_FILE => {
                let a: WriteArgs = args(name, input)?;
                Self::WriteFile {
                    path: a.path,
                    content: a.content,
                }
            }
            EDIT_FILE => {
                let a: EditArgs = args(name, input)?;
                Self::EditFile {
                    path: a.path,
                    old_string: a.old_string,
                    new_string: a.new_string,
                }
            }
            LIST_FILES => {
                let a: PatternArgs = args(name, input)?;
                Self::ListFiles { pattern: a.pattern }
            }
            LOG_PROGRESS => {
                let a: LogArgs = args(name, input)?;
                let level = a
                    .level
                    .as_deref()
                    .and_then(|l| l.parse().ok())
                    .unwrap_or_default();
                Self::LogProgress {
                    message: a.message,
                    level,
                }
            }
            other => return Err(ToolError::UnknownTool(other.to_string())),
        };
        Ok(call)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ReadFile { .. } => READ_FILE,
            Self::WriteFile { .. } => WRITE_FILE,
            Self::EditFile { .. } => EDIT_FILE,
            Self::ListFiles { .. } => LIST_FILES,
            Self::LogProgress { .. } => LOG_PROGRESS,
        }
    }

    /// 修改检出目录的调用返回目标路径
    pub fn mutated_path(&self) -> Option<&str> {
        match self {
            Self::WriteFile { path, .. } | Self::EditFile { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// 发给模型的工具声明
pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: READ_FILE.into(),
            description: "Read the contents of a file. Use this to examine existing code before making changes.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Relative path to the file from project root (e.g., 'app.py' or 'templates/index.html')"
                    }
                },
                "required": ["path"]
            }),
        },
        ToolDefinition {
            name: WRITE_FILE.into(),
            description: "Write content to a file. This will overwrite the entire file. Use for creating new files or completely rewriting existing ones.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Relative path to the file from project root"
                    },
                    "content": {
                        "type": "string",
                        "description": "The complete content to write to the file"
                    }
                },
                "required": ["path", "content"]
            }),
        },
        ToolDefinition {
            name: EDIT_FILE.into(),
            description: "Make a targeted edit to a file by replacing a specific string with new content. More precise than write_file for small changes.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Relative path to the file from project root"
                    },
                    "old_string": {
                        "type": "string",
                        "description": "The exact string to find and replace (must be unique in the file)"
                    },
                    "new_string": {
                        "type": "string",
                        "description": "The string to replace it with"
                    }
                },
                "required": ["path", "old_string", "new_string"]
            }),
        },
        ToolDefinition {
            name: LIST_FILES.into(),
            description: "List files in a directory or matching a glob pattern.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "pattern": {
                        "type": "string",
                        "description": "Glob pattern (e.g., '*.py', 'templates/*.html', '**/*.js')"
                    }
                },
                "required": ["pattern"]
            }),
        },
        ToolDefinition {
            name: LOG_PROGRESS.into(),
            description: "Log progress message to the request log. Use this to communicate what you're doing.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "message": {
                        "type": "string",
                        "description": "Progress message to log"
                    },
                    "level": {
                        "type": "string",
                        "enum": ["info", "success", "warning", "error"],
                        "description": "Log level"
                    }
                },
                "required": ["message"]
            }),
        },
    ]
}
