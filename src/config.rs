//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `INCEPT__*` 覆盖（双下划线表示嵌套，如 `INCEPT__PROCESSOR__MAX_ITERATIONS=20`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 内置默认模型（优先级最低：请求覆盖 > 项目设置 > 此值）
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub processor: ProcessorSection,
    #[serde(default)]
    pub git: GitSection,
}

/// [app] 段：数据目录与数据库路径
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// SQLite 文件，未设置时为 `<data_dir>/incept.db`
    pub database: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database: None,
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl AppSection {
    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| self.data_dir.join("incept.db"))
    }

    /// 可热更新的系统提示词文件
    pub fn system_prompt_path(&self) -> PathBuf {
        self.data_dir.join("prompts").join("incept_system.txt")
    }
}

/// [llm] 段：后端、模型、单次调用上限与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 未设置时读取环境变量 ANTHROPIC_API_KEY
    pub api_key: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            api_key: None,
            max_tokens: default_max_tokens(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "anthropic".to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    120
}

impl LlmSection {
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .filter(|k| !k.is_empty())
    }
}

/// [processor] 段：轮询间隔、迭代上限、默认模式、工具超时
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorSection {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_mode")]
    pub default_mode: String,
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for ProcessorSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            max_iterations: default_max_iterations(),
            default_mode: default_mode(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_max_iterations() -> usize {
    50
}

fn default_mode() -> String {
    "api".to_string()
}

fn default_tool_timeout_secs() -> u64 {
    30
}

impl ProcessorSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs.max(1))
    }
}

/// [git] 段：命令超时、机器人身份、默认令牌
#[derive(Debug, Clone, Deserialize)]
pub struct GitSection {
    #[serde(default = "default_git_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_push_timeout_secs")]
    pub push_timeout_secs: u64,
    #[serde(default = "default_bot_name")]
    pub bot_name: String,
    #[serde(default = "default_bot_email")]
    pub bot_email: String,
    /// 项目未配置令牌时使用；未设置时读取环境变量 GITHUB_TOKEN
    pub default_token: Option<String>,
}

impl Default for GitSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_git_timeout_secs(),
            push_timeout_secs: default_push_timeout_secs(),
            bot_name: default_bot_name(),
            bot_email: default_bot_email(),
            default_token: None,
        }
    }
}

fn default_git_timeout_secs() -> u64 {
    10
}

fn default_push_timeout_secs() -> u64 {
    30
}

fn default_bot_name() -> String {
    "Inception System".to_string()
}

fn default_bot_email() -> String {
    "incept@inception-system.local".to_string()
}

impl GitSection {
    pub fn resolved_default_token(&self) -> Option<String> {
        self.default_token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .filter(|t| !t.is_empty())
    }
}

/// 从 config 目录加载配置，环境变量 INCEPT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 INCEPT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("INCEPT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
