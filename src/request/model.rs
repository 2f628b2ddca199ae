//! 请求、日志、项目的数据模型
//!
//! 状态机：pending -> processing -> completed | error；pending | processing -> cancelled。
//! 终态（completed / error / cancelled）只能进入一次。

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::InceptError;

/// 请求 ID（SQLite 自增主键）
pub type RequestId = i64;
/// 项目 ID
pub type ProjectId = i64;

/// 请求状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// 等待调度器认领
    Pending,
    /// 正在执行（全局至多一个）
    Processing,
    Completed,
    Error,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }

    /// 状态图中是否存在 self -> next 这条边
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Pending, Self::Cancelled)
                | (Self::Processing, Self::Cancelled)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Error)
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = InceptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(InceptError::InvalidValue(format!("request status '{other}'"))),
        }
    }
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = InceptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "success" => Ok(Self::Success),
            "warning" | "warn" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            other => Err(InceptError::InvalidValue(format!("log level '{other}'"))),
        }
    }
}

/// 请求：一次自然语言变更指令
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub project_id: ProjectId,
    /// 指令文本，创建后不可变
    pub text: String,
    pub status: RequestStatus,
    /// 终态时填充的摘要
    pub response: Option<String>,
    /// 执行模式覆盖；None 表示沿用项目设置或内置默认
    pub mode: Option<String>,
    /// 模型覆盖；None 表示沿用项目设置或内置默认
    pub model: Option<String>,
    /// 重启来源（仅用于上下文重建）
    pub parent_id: Option<RequestId>,
    pub auto_push: bool,
    pub created_at: DateTime<Utc>,
    /// 进入终态时写入且仅写入一次
    pub completed_at: Option<DateTime<Utc>>,
}

/// 请求日志条目（只追加，不修改）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub request_id: RequestId,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// 项目（核心引擎只读）
#[derive(Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    /// 检出目录
    pub local_path: PathBuf,
    pub repo_url: Option<String>,
    pub repo_branch: String,
    pub access_token: Option<String>,
    /// 项目级默认模式（processor_settings 表）
    pub default_mode: Option<String>,
    /// 项目级默认模型（processor_settings 表）
    pub default_model: Option<String>,
}

// 手写 Debug：令牌不进日志
impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("local_path", &self.local_path)
            .field("repo_url", &self.repo_url)
            .field("repo_branch", &self.repo_branch)
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .field("default_mode", &self.default_mode)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// 新建项目参数
#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub name: String,
    pub local_path: PathBuf,
    pub repo_url: Option<String>,
    pub repo_branch: Option<String>,
    pub access_token: Option<String>,
}

/// 提交请求参数
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub project_id: ProjectId,
    pub text: String,
    pub mode: Option<String>,
    pub model: Option<String>,
    pub parent_id: Option<RequestId>,
    pub auto_push: bool,
}

impl NewRequest {
    pub fn new(project_id: ProjectId, text: impl Into<String>) -> Self {
        Self {
            project_id,
            text: text.into(),
            mode: None,
            model: None,
            parent_id: None,
            auto_push: true,
        }
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_auto_push(mut self, auto_push: bool) -> Self {
        self.auto_push = auto_push;
        self
    }
}

/// restart 时可覆盖的字段；None 表示沿用原请求
#[derive(Debug, Clone, Default)]
pub struct RestartOverrides {
    pub text: Option<String>,
    pub mode: Option<String>,
    pub model: Option<String>,
    pub auto_push: Option<bool>,
}

/// 执行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// 通过模型 API + 工具调用执行
    Api,
    /// 本地 CLI 工作流（无人值守处理器不执行）
    Local,
}

impl FromStr for ExecutionMode {
    type Err = InceptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "api" => Ok(Self::Api),
            "local" | "cli" => Ok(Self::Local),
            other => Err(InceptError::UnsupportedMode(other.to_string())),
        }
    }
}

/// 解析后的执行配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionProfile {
    pub mode: ExecutionMode,
    pub model: String,
}

/// 内置默认（来自配置文件）
#[derive(Debug, Clone)]
pub struct ExecutionDefaults {
    pub mode: String,
    pub model: String,
}

/// 统一的模式 / 模型优先级：请求覆盖 > 项目设置 > 内置默认
///
/// 所有调用点都经过这里，空字符串视为未设置。
pub fn resolve_profile(
    request: &Request,
    project: &Project,
    defaults: &ExecutionDefaults,
) -> Result<ExecutionProfile, InceptError> {
    fn pick<'a>(candidates: [Option<&'a str>; 2], fallback: &'a str) -> &'a str {
        candidates
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())
            .unwrap_or(fallback)
    }

    let mode = pick(
        [request.mode.as_deref(), project.default_mode.as_deref()],
        &defaults.mode,
    );
    let model = pick(
        [request.model.as_deref(), project.default_model.as_deref()],
        &defaults.model,
    );
    Ok(ExecutionProfile {
        mode: mode.parse()?,
        model: model.to_string(),
    })
}
