//! git 子进程
//!
//! 每次调用都有超时，超时后子进程随 future 一起被 kill；禁用交互式凭据提示，避免 push 卡住。

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

#[derive(Error, Debug, Clone)]
pub enum GitError {
    #[error("failed to run git {args}: {reason}")]
    Spawn { args: String, reason: String },

    #[error("git {args} timed out after {secs}s")]
    Timeout { args: String, secs: u64 },

    #[error("git {args} exited with {code}: {stderr}")]
    Failed {
        args: String,
        code: i32,
        stderr: String,
    },
}

#[derive(Debug, Clone)]
pub struct GitOutput {
    pub success: bool,
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// 绑定工作目录的 git 调用器
#[derive(Debug, Clone)]
pub struct Git {
    dir: PathBuf,
}

impl Git {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// 执行并返回输出，非零退出码不算错误
    pub async fn output(&self, args: &[&str], limit: Duration) -> Result<GitOutput, GitError> {
        // 参数里可能有带令牌的远程地址，日志与错误只用脱敏后的文本
        let joined = display_args(args);
        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(&self.dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match timeout(limit, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(GitError::Spawn {
                    args: joined,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(GitError::Timeout {
                    args: joined,
                    secs: limit.as_secs(),
                })
            }
        };

        let result = GitOutput {
            success: output.status.success(),
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        tracing::debug!(args = %joined, code = result.code, "git");
        Ok(result)
    }

    /// 执行并要求成功，返回 stdout
    pub async fn run(&self, args: &[&str], limit: Duration) -> Result<String, GitError> {
        let out = self.output(args, limit).await?;
        if out.success {
            Ok(out.stdout)
        } else {
            Err(GitError::Failed {
                args: display_args(args),
                code: out.code,
                stderr: out.stderr.trim().to_string(),
            })
        }
    }
}

fn display_args(args: &[&str]) -> String {
    redact(&args.join(" "), None)
}

fn credentials_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)(https?://)[^/@\s]+@").ok())
        .as_ref()
}

/// 去掉文本中出现的令牌与 URL 内嵌凭据
pub fn redact(text: &str, token: Option<&str>) -> String {
    let mut out = match credentials_pattern() {
        Some(re) => re.replace_all(text, "${1}***@").to_string(),
        None => text.to_string(),
    };
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        out = out.replace(token, "***");
    }
    out
}
