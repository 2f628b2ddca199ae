//! 工具箱：固定的文件 / 进度工具目录，绑定到单个检出目录执行
//!
//! 工具失败不向上抛出：ToolError 渲染为 `Error: ...` 字符串回填给模型，由模型自行修正。

pub mod catalog;
pub mod edit_file;
pub mod executor;
pub mod list_files;
pub mod read_file;
pub mod sandbox;
pub mod write_file;

use thiserror::Error;

pub use catalog::{definitions, ToolCall};
pub use executor::{FileChange, ToolExecutor, ToolOutcome};
pub use sandbox::Sandbox;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Could not find the specified string in {0}. The string to replace was not found.")]
    StringNotFound(String),

    #[error("The string appears {0} times in the file. Please provide a more unique string to replace.")]
    AmbiguousMatch(usize),

    #[error("Path '{0}' is outside the project directory")]
    PathEscape(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid input for {tool}: {reason}")]
    InvalidInput { tool: String, reason: String },

    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Tool {0} timed out after {1}s")]
    Timeout(String, u64),

    #[error("Error executing {tool}: {reason}")]
    Io { tool: String, reason: String },
}

impl ToolError {
    /// 回填给模型的文本
    pub fn render(&self) -> String {
        format!("Error: {}", self)
    }

    pub(crate) fn io(tool: &str, e: impl std::fmt::Display) -> Self {
        Self::Io {
            tool: tool.to_string(),
            reason: e.to_string(),
        }
    }
}
