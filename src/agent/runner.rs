//! 请求执行器
//!
//! 一个已认领（processing）的请求从这里走完：项目与检出目录检查、模式 / 模型解析、
//! 续作上下文、工具调用主循环、终态写入，最后在有文件变更且 auto_push 时发布。
//! 终态写入是比较并交换；执行期间被取消的请求不会被覆盖，也不会发布。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::agent::continuation::build_continuation;
use crate::agent::loop_::{AgentLoop, LoopExit, LoopSettings};
use crate::agent::prompt::{build_user_message, load_system_prompt};
use crate::config::AppConfig;
use crate::core::InceptError;
use crate::git::{PublishError, PublishOutcome, PublishTarget, Publisher};
use crate::llm::LlmClient;
use crate::request::{
    resolve_profile, ExecutionDefaults, ExecutionMode, LogLevel, Project, Request, RequestId,
    RequestJournal, RequestLifecycle, RequestStatus, RunLog,
};
use crate::tools::{FileChange, Sandbox, ToolExecutor};

/// 最终回复写入摘要的最大字符数
const FINAL_TEXT_CHARS: usize = 1000;
/// 提交信息中请求文本的最大字符数
const COMMIT_TEXT_CHARS: usize = 50;

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub defaults: ExecutionDefaults,
    pub max_tokens: u32,
    pub max_iterations: usize,
    pub tool_timeout: Duration,
    /// 可热更新的系统提示词文件
    pub system_prompt_path: Option<PathBuf>,
}

impl RunnerSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            defaults: ExecutionDefaults {
                mode: cfg.processor.default_mode.clone(),
                model: cfg.llm.model.clone(),
            },
            max_tokens: cfg.llm.max_tokens,
            max_iterations: cfg.processor.max_iterations,
            tool_timeout: cfg.processor.tool_timeout(),
            system_prompt_path: Some(cfg.app.system_prompt_path()),
        }
    }
}

#[derive(Clone)]
pub struct RequestRunner {
    lifecycle: RequestLifecycle,
    llm: Arc<dyn LlmClient>,
    publisher: Arc<Publisher>,
    settings: Arc<RunnerSettings>,
}

impl RequestRunner {
    pub fn new(
        lifecycle: RequestLifecycle,
        llm: Arc<dyn LlmClient>,
        publisher: Publisher,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            lifecycle,
            llm,
            publisher: Arc::new(publisher),
            settings: Arc::new(settings),
        }
    }

    pub fn lifecycle(&self) -> &RequestLifecycle {
        &self.lifecycle
    }

    /// 模型客户端自启动以来的累计用量 (input, output, total)
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 执行一个 processing 请求直到终态，返回请求最终所处的状态
    pub async fn process(&self, request: Request) -> RequestStatus {
        let id = request.id;
        tracing::info!(
            request_id = id,
            project_id = request.project_id,
            parent_id = ?request.parent_id,
            "Processing request"
        );

        let project = match self.lifecycle.project(request.project_id) {
            Ok(Some(project)) => project,
            Ok(None) => {
                return self.fail_early(
                    id,
                    &format!("Project ID {} not found", request.project_id),
                    "Project not found",
                )
            }
            Err(e) => {
                let msg = format!("Error: {}", e);
                return self.fail_early(id, &msg, &msg);
            }
        };
        if !project.local_path.is_dir() {
            return self.fail_early(
                id,
                &format!("Project path not found: {}", project.local_path.display()),
                "Project path not found",
            );
        }

        let journal =
            RequestJournal::start(&project.local_path, id, &project.name, &request.text);
        let log = RunLog::new(id, self.lifecycle.clone(), Some(journal.clone()));
        let status = self.run_in_checkout(&request, &project, &log).await;
        journal.finish(status);
        tracing::info!(request_id = id, status = %status, "Request finished");
        status
    }

    async fn run_in_checkout(&self, request: &Request, project: &Project, log: &RunLog) -> RequestStatus {
        let id = request.id;
        let profile = match resolve_profile(request, project, &self.settings.defaults) {
            Ok(profile) => profile,
            Err(e) => {
                log.error(e.to_string());
                return self.conclude(id, RequestStatus::Error, &e.to_string(), log).0;
            }
        };
        if profile.mode == ExecutionMode::Local {
            log.error("CLI mode not yet supported for multi-project");
            return self
                .conclude(id, RequestStatus::Error, "CLI mode not supported", log)
                .0;
        }

        log.info(format!("Processing via API with model: {}", profile.model));
        let sandbox = match Sandbox::new(&project.local_path) {
            Ok(sandbox) => sandbox,
            Err(e) => {
                log.error(format!("Project path not found: {} ({})", project.local_path.display(), e));
                return self
                    .conclude(id, RequestStatus::Error, "Project path not found", log)
                    .0;
            }
        };
        let tools = ToolExecutor::new(sandbox, self.settings.tool_timeout, log.clone());
        let loop_settings = LoopSettings {
            model: profile.model,
            system_prompt: load_system_prompt(self.settings.system_prompt_path.as_deref()),
            max_tokens: self.settings.max_tokens,
            max_iterations: self.settings.max_iterations,
        };

        let continuation = build_continuation(&self.lifecycle, request);
        if let (Some(parent_id), false) = (request.parent_id, continuation.is_empty()) {
            log.info(format!("Continuing from request #{}", parent_id));
        }
        let user_message = build_user_message(&project.name, &request.text, &continuation);

        log.info("Starting agentic loop with tools...");
        let lifecycle = self.lifecycle.clone();
        let is_cancelled = move || lifecycle.is_cancelled(id).unwrap_or(false);
        let report = match AgentLoop::new(self.llm.as_ref(), &tools, &loop_settings)
            .run(user_message, &is_cancelled)
            .await
        {
            Ok(report) => report,
            Err(e) => {
                let msg = format!("Error: {}", e);
                log.error(&msg);
                return self.conclude(id, RequestStatus::Error, &msg, log).0;
            }
        };

        let tokens = format!(
            "Tokens: {} in, {} out",
            report.input_tokens, report.output_tokens
        );
        let response = match &report.exit {
            LoopExit::Cancelled { iterations } => {
                log.warning(format!(
                    "Request cancelled, stopped after {} iterations",
                    iterations
                ));
                return RequestStatus::Cancelled;
            }
            LoopExit::Finished {
                iterations,
                final_text,
            } => {
                log.success(format!("Completed after {} iterations", iterations));
                log.info(&tokens);
                completion_summary(&report.changes, final_text)
            }
            LoopExit::MaxIterations { iterations } => {
                log.warning(format!("Max iterations ({}) reached", iterations));
                log.info(&tokens);
                format!(
                    "Completed with {} changes (max iterations reached)",
                    report.changes.len()
                )
            }
        };

        let (status, applied) = self.conclude(id, RequestStatus::Completed, &response, log);
        if !applied || report.changes.is_empty() {
            return status;
        }
        if request.auto_push {
            // 发布失败只记日志，completed 不回滚
            let _ = self.publish(request, project, log).await;
        } else {
            log.info("Changes made but not pushed (auto_push disabled). Use push button to push manually.");
        }
        status
    }

    /// 手动发布一个已完成的请求（auto_push 关闭时的“推送”按钮），不改变请求状态
    pub async fn publish_request(&self, id: RequestId) -> Result<PublishOutcome, InceptError> {
        let request = self
            .lifecycle
            .get(id)?
            .ok_or(InceptError::RequestNotFound(id))?;
        if request.status != RequestStatus::Completed {
            return Err(InceptError::InvalidValue(format!(
                "request #{} is {}; only completed requests can be pushed",
                id, request.status
            )));
        }
        let project = self
            .lifecycle
            .project(request.project_id)?
            .ok_or_else(|| InceptError::ProjectNotFound(request.project_id.to_string()))?;
        if !project.local_path.is_dir() {
            return Err(InceptError::CheckoutMissing(project.local_path.clone()));
        }

        let log = RunLog::new(
            id,
            self.lifecycle.clone(),
            Some(RequestJournal::resume(&project.local_path, id)),
        );
        log.info("Manual push requested");
        Ok(self.publish(&request, &project, &log).await?)
    }

    async fn publish(
        &self,
        request: &Request,
        project: &Project,
        log: &RunLog,
    ) -> Result<PublishOutcome, PublishError> {
        let target = PublishTarget {
            checkout: &project.local_path,
            repo_url: project.repo_url.as_deref(),
            branch: &project.repo_branch,
            token: project.access_token.as_deref(),
        };
        match self
            .publisher
            .publish(&target, &commit_message(request), log)
            .await
        {
            Ok(outcome) => {
                if let PublishOutcome::Pushed { commit, refspec, .. } = &outcome {
                    tracing::info!(request_id = request.id, commit = %commit, refspec = %refspec, "Published");
                }
                Ok(outcome)
            }
            Err(e) => {
                log.error(e.operator_message());
                tracing::warn!(request_id = request.id, stage = %e.stage, detail = %e.detail, "Publish failed");
                Err(e)
            }
        }
    }

    /// 尚未建立日志文件时的失败路径
    fn fail_early(&self, id: RequestId, log_message: &str, response: &str) -> RequestStatus {
        tracing::error!(request_id = id, "{}", log_message);
        if let Err(e) = self.lifecycle.log(id, LogLevel::Error, log_message) {
            tracing::warn!(request_id = id, error = %e, "Failed to persist request log");
        }
        match self.lifecycle.finalize(id, RequestStatus::Error, response) {
            Ok(()) => RequestStatus::Error,
            Err(e) => self.rejected_finalize(id, RequestStatus::Error, e, None),
        }
    }

    /// 写入终态；返回 (请求实际状态, 是否由本次写入)
    fn conclude(
        &self,
        id: RequestId,
        status: RequestStatus,
        response: &str,
        log: &RunLog,
    ) -> (RequestStatus, bool) {
        match self.lifecycle.finalize(id, status, response) {
            Ok(()) => (status, true),
            Err(e) => (self.rejected_finalize(id, status, e, Some(log)), false),
        }
    }

    fn rejected_finalize(
        &self,
        id: RequestId,
        wanted: RequestStatus,
        error: InceptError,
        log: Option<&RunLog>,
    ) -> RequestStatus {
        match error {
            InceptError::InvalidTransition { from, .. } => {
                let msg = format!(
                    "Request was {} before it finished; {} result discarded",
                    from, wanted
                );
                match log {
                    Some(log) => log.warning(&msg),
                    None => tracing::warn!(request_id = id, "{}", msg),
                }
                from
            }
            other => {
                tracing::error!(request_id = id, error = %other, "Failed to finalize request");
                self.lifecycle
                    .store()
                    .status_of(id)
                    .ok()
                    .flatten()
                    .unwrap_or(RequestStatus::Processing)
            }
        }
    }
}

/// 完成摘要：文件变更列表 + 模型最终回复（截断）
pub fn completion_summary(changes: &[FileChange], final_text: &str) -> String {
    let mut summary = if changes.is_empty() {
        "No file changes made".to_string()
    } else {
        let lines: Vec<String> = changes
            .iter()
            .map(|c| format!("- {}: {}", c.tool, c.path))
            .collect();
        format!("Changes made:\n{}", lines.join("\n"))
    };
    let head: String = final_text.chars().take(FINAL_TEXT_CHARS).collect();
    summary.push_str("\n\nFinal response:\n");
    summary.push_str(&head);
    summary
}

pub fn commit_message(request: &Request) -> String {
    let head: String = request.text.chars().take(COMMIT_TEXT_CHARS).collect();
    format!("Incept #{}: {}", request.id, head)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn test_completion_summary() {
        let changes = vec![
            FileChange {
                tool: "edit_file".into(),
                path: "utils.py".into(),
            },
            FileChange {
                tool: "write_file".into(),
                path: "README.md".into(),
            },
        ];
        let summary = completion_summary(&changes, &"x".repeat(1500));
        assert!(summary.starts_with("Changes made:\n- edit_file: utils.py\n- write_file: README.md\n\nFinal response:\n"));
        assert!(summary.ends_with(&"x".repeat(1000)));
        assert!(!summary.contains(&"x".repeat(1001)));

        assert_eq!(
            completion_summary(&[], "Nothing to do."),
            "No file changes made\n\nFinal response:\nNothing to do."
        );
    }

    #[test]
    fn test_commit_message_truncates_text() {
        let request = Request {
            id: 42,
            project_id: 1,
            text: "a".repeat(80),
            status: RequestStatus::Completed,
            response: None,
            mode: None,
            model: None,
            parent_id: None,
            auto_push: true,
            created_at: Utc::now(),
            completed_at: None,
        };
        assert_eq!(commit_message(&request), format!("Incept #42: {}", "a".repeat(50)));
    }
}
