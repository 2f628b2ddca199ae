//! 版本控制发布
//!
//! 工作区干净时直接返回；否则 add -A + commit（缺身份时配置机器人身份），确保 origin 存在，
//! HTTPS 远程按需嵌入令牌，最后 push。游离 HEAD 时推送到 `HEAD:<目标分支>`。
//! 任一步失败即终止并报告该步骤，不重试，也不回滚已产生的本地提交。

use std::fmt;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::config::GitSection;
use crate::git::command::{redact, Git, GitError};
use crate::request::RunLog;

/// 发布目标（来自项目记录）
#[derive(Debug, Clone, Copy)]
pub struct PublishTarget<'a> {
    pub checkout: &'a Path,
    pub repo_url: Option<&'a str>,
    pub branch: &'a str,
    pub token: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// 工作区干净，未产生提交
    NothingToCommit,
    Pushed {
        commit: String,
        /// 推送的引用：当前分支名，或游离 HEAD 时的 `HEAD:<branch>`
        refspec: String,
        changed_files: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStage {
    Status,
    Identity,
    Stage,
    Commit,
    Remote,
    Branch,
    Push,
}

impl fmt::Display for PublishStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Status => "status",
            Self::Identity => "config",
            Self::Stage => "add",
            Self::Commit => "commit",
            Self::Remote => "remote",
            Self::Branch => "branch",
            Self::Push => "push",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishErrorKind {
    Auth,
    Timeout,
    NoRemote,
    Command,
}

#[derive(Error, Debug, Clone)]
#[error("{}", self.operator_message())]
pub struct PublishError {
    pub stage: PublishStage,
    pub kind: PublishErrorKind,
    /// 已脱敏
    pub detail: String,
}

impl PublishError {
    /// 面向操作者的日志文本
    pub fn operator_message(&self) -> String {
        match (self.kind, self.stage) {
            (PublishErrorKind::Auth, _) => {
                "Git push auth failed. Check GitHub token for this project.".to_string()
            }
            (PublishErrorKind::NoRemote, _) => "No git remote configured for this project.".to_string(),
            (PublishErrorKind::Timeout, stage) => format!("Git {} timed out: {}", stage, self.detail),
            (PublishErrorKind::Command, PublishStage::Push) => {
                format!("Git push failed: {}", self.detail)
            }
            (PublishErrorKind::Command, stage) => format!("Git {} failed: {}", stage, self.detail),
        }
    }
}

const AUTH_PHRASES: [&str; 4] = [
    "Authentication failed",
    "could not read Username",
    "could not read Password",
    "Invalid username or password",
];

pub struct Publisher {
    timeout: Duration,
    push_timeout: Duration,
    bot_name: String,
    bot_email: String,
    default_token: Option<String>,
}

impl Publisher {
    pub fn new(timeout: Duration, push_timeout: Duration, bot_name: &str, bot_email: &str) -> Self {
        Self {
            timeout,
            push_timeout,
            bot_name: bot_name.to_string(),
            bot_email: bot_email.to_string(),
            default_token: None,
        }
    }

    pub fn from_config(cfg: &GitSection) -> Self {
        let mut publisher = Self::new(
            Duration::from_secs(cfg.timeout_secs),
            Duration::from_secs(cfg.push_timeout_secs),
            &cfg.bot_name,
            &cfg.bot_email,
        );
        publisher.default_token = cfg.resolved_default_token();
        publisher
    }

    pub async fn publish(
        &self,
        target: &PublishTarget<'_>,
        message: &str,
        log: &RunLog,
    ) -> Result<PublishOutcome, PublishError> {
        let token = target
            .token
            .filter(|t| !t.trim().is_empty())
            .or(self.default_token.as_deref());
        let git = Git::new(target.checkout);
        let fail = |stage: PublishStage, e: GitError| classify(stage, e, token);

        let status = git
            .run(&["status", "--porcelain"], self.timeout)
            .await
            .map_err(|e| fail(PublishStage::Status, e))?;
        let changed_files = status.lines().filter(|l| !l.trim().is_empty()).count();
        if changed_files == 0 {
            log.info("No changes to commit");
            return Ok(PublishOutcome::NothingToCommit);
        }
        log.info(format!("Found {} changed file(s), committing...", changed_files));

        self.ensure_identity(&git)
            .await
            .map_err(|e| fail(PublishStage::Identity, e))?;
        git.run(&["add", "-A"], self.timeout)
            .await
            .map_err(|e| fail(PublishStage::Stage, e))?;
        git.run(&["commit", "-q", "-m", message], self.timeout)
            .await
            .map_err(|e| fail(PublishStage::Commit, e))?;
        let commit = git
            .run(&["rev-parse", "--short", "HEAD"], self.timeout)
            .await
            .map_err(|e| fail(PublishStage::Commit, e))?
            .trim()
            .to_string();
        tracing::info!(commit = %commit, checkout = %target.checkout.display(), "Committed changes");

        let remote_url = self.ensure_origin(&git, target.repo_url, token).await?;
        if let Some(push_url) = token.and_then(|t| authenticated_url(&remote_url, t)) {
            git.run(&["remote", "set-url", "origin", &push_url], self.timeout)
                .await
                .map_err(|e| fail(PublishStage::Remote, e))?;
        }

        let current = git
            .run(&["branch", "--show-current"], self.timeout)
            .await
            .map_err(|e| fail(PublishStage::Branch, e))?
            .trim()
            .to_string();
        let target_branch = if target.branch.trim().is_empty() {
            "main"
        } else {
            target.branch.trim()
        };
        let (args, refspec): (Vec<String>, String) = if current.is_empty() {
            // 游离 HEAD（部署平台常见）：直接推到目标分支
            let refspec = format!("HEAD:{}", target_branch);
            (vec!["push".into(), "origin".into(), refspec.clone()], refspec)
        } else {
            (
                vec!["push".into(), "-u".into(), "origin".into(), current.clone()],
                current,
            )
        };

        log.info("Pushing to remote...");
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let pushed = git
            .output(&arg_refs, self.push_timeout)
            .await
            .map_err(|e| fail(PublishStage::Push, e))?;
        if !pushed.success {
            return Err(classify(
                PublishStage::Push,
                GitError::Failed {
                    args: args.join(" "),
                    code: pushed.code,
                    stderr: pushed.stderr.trim().to_string(),
                },
                token,
            ));
        }

        log.success("Changes pushed to git successfully");
        Ok(PublishOutcome::Pushed {
            commit,
            refspec,
            changed_files,
        })
    }

    /// 仓库（含全局配置）没有提交者身份时写入机器人身份
    async fn ensure_identity(&self, git: &Git) -> Result<(), GitError> {
        let email = git.output(&["config", "user.email"], self.timeout).await?;
        if !email.success || email.stdout.trim().is_empty() {
            git.run(&["config", "user.email", &self.bot_email], self.timeout)
                .await?;
        }
        let name = git.output(&["config", "user.name"], self.timeout).await?;
        if !name.success || name.stdout.trim().is_empty() {
            git.run(&["config", "user.name", &self.bot_name], self.timeout)
                .await?;
        }
        Ok(())
    }

    /// 返回 origin 当前地址；不存在时用项目地址添加
    async fn ensure_origin(
        &self,
        git: &Git,
        repo_url: Option<&str>,
        token: Option<&str>,
    ) -> Result<String, PublishError> {
        let existing = git
            .output(&["remote", "get-url", "origin"], self.timeout)
            .await
            .map_err(|e| classify(PublishStage::Remote, e, token))?;
        if existing.success && !existing.stdout.trim().is_empty() {
            return Ok(existing.stdout.trim().to_string());
        }
        let Some(url) = repo_url.map(str::trim).filter(|u| !u.is_empty()) else {
            return Err(PublishError {
                stage: PublishStage::Remote,
                kind: PublishErrorKind::NoRemote,
                detail: "origin is not configured and the project has no repository URL".into(),
            });
        };
        git.run(&["remote", "add", "origin", url], self.timeout)
            .await
            .map_err(|e| classify(PublishStage::Remote, e, token))?;
        Ok(url.to_string())
    }
}

/// 不带凭据的 https 地址嵌入令牌；其它情况返回 None
pub fn authenticated_url(remote: &str, token: &str) -> Option<String> {
    let mut url = Url::parse(remote).ok()?;
    if url.scheme() != "https" || !url.username().is_empty() || url.password().is_some() {
        return None;
    }
    url.set_username(token).ok()?;
    Some(url.to_string())
}

fn classify(stage: PublishStage, error: GitError, token: Option<&str>) -> PublishError {
    let (kind, detail) = match &error {
        GitError::Timeout { .. } => (PublishErrorKind::Timeout, error.to_string()),
        GitError::Failed { stderr, .. } if AUTH_PHRASES.iter().any(|p| stderr.contains(p)) => {
            (PublishErrorKind::Auth, stderr.clone())
        }
        GitError::Failed { stderr, .. } => (PublishErrorKind::Command, stderr.clone()),
        GitError::Spawn { .. } => (PublishErrorKind::Command, error.to_string()),
    };
    PublishError {
        stage,
        kind,
        detail: redact(&detail, token),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authenticated_url_only_for_plain_https() {
        assert_eq!(
            authenticated_url("https://github.com/acme/app.git", "ghp_x").as_deref(),
            Some("https://ghp_x@github.com/acme/app.git")
        );
        assert!(authenticated_url("https://ghp_x@github.com/acme/app.git", "ghp_x").is_none());
        assert!(authenticated_url("git@github.com:acme/app.git", "ghp_x").is_none());
        assert!(authenticated_url("/srv/git/app.git", "ghp_x").is_none());
        assert!(authenticated_url("http://example.com/app.git", "ghp_x").is_none());
    }

    #[test]
    fn test_classify_auth_and_redacts() {
        let err = classify(
            PublishStage::Push,
            GitError::Failed {
                args: "push".into(),
                code: 128,
                stderr: "fatal: Authentication failed for 'https://ghp_x@github.com/a/b.git/'".into(),
            },
            Some("ghp_x"),
        );
        assert_eq!(err.kind, PublishErrorKind::Auth);
        assert!(!err.detail.contains("ghp_x"));
        assert_eq!(
            err.to_string(),
            "Git push auth failed. Check GitHub token for this project."
        );
    }

    #[test]
    fn test_classify_generic_push_failure() {
        let err = classify(
            PublishStage::Push,
            GitError::Failed {
                args: "push".into(),
                code: 1,
                stderr: "! [rejected] main -> main (fetch first)".into(),
            },
            None,
        );
        assert_eq!(err.kind, PublishErrorKind::Command);
        assert!(err.to_string().starts_with("Git push failed: ! [rejected]"));

        let timeout = classify(
            PublishStage::Push,
            GitError::Timeout {
                args: "push".into(),
                secs: 30,
            },
            None,
        );
        assert_eq!(timeout.kind, PublishErrorKind::Timeout);
    }
}
