//! 引擎错误类型
//!
//! 分层：工具错误留在对话里（ToolError，见 tools 模块）；循环级错误（本类型）终结请求为 error；
//! 发布错误（PublishError，见 git 模块）只记日志，不回滚 completed。

use std::path::PathBuf;

use thiserror::Error;

use crate::git::PublishError;
use crate::llm::LlmError;
use crate::request::{RequestId, RequestStatus};

/// 引擎运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum InceptError {
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Request not found: #{0}")]
    RequestNotFound(RequestId),

    #[error("Project path not found: {}", .0.display())]
    CheckoutMissing(PathBuf),

    /// 状态机拒绝的迁移（如对已终态请求再次 finalize）
    #[error("Request #{id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: RequestId,
        from: RequestStatus,
        to: RequestStatus,
    },

    #[error("Unsupported mode: {0}")]
    UnsupportedMode(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// 模型 API 失败（网络 / 鉴权 / 限流），对当前请求是致命的
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// 手动发布失败（自动发布失败只记日志）
    #[error("{0}")]
    Publish(#[from] PublishError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

impl From<config::ConfigError> for InceptError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
