//! 集成测试共用：临时 git 仓库（本地裸仓库作为 origin）与引擎装配

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use incept::agent::{RequestRunner, RunnerSettings};
use incept::git::Publisher;
use incept::llm::LlmClient;
use incept::request::{ExecutionDefaults, NewProject, NewRequest, ProjectId, RequestLifecycle, RunLog};
use incept::store::Store;
use tempfile::TempDir;

pub fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("git should be installed");
    assert!(
        out.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

/// 检出目录 + 裸仓库 origin，main 分支上有一个初始提交
pub struct Fixture {
    _root: TempDir,
    pub checkout: PathBuf,
    pub origin: PathBuf,
}

impl Fixture {
    pub fn new(files: &[(&str, &str)]) -> Self {
        let root = tempfile::tempdir().unwrap();
        let origin = root.path().join("origin.git");
        let checkout = root.path().join("work");
        std::fs::create_dir_all(&origin).unwrap();
        std::fs::create_dir_all(&checkout).unwrap();

        git(&origin, &["init", "-q", "--bare"]);
        git(&origin, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git(&checkout, &["init", "-q"]);
        git(&checkout, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git(&checkout, &["config", "user.name", "Fixture"]);
        git(&checkout, &["config", "user.email", "fixture@example.com"]);
        for (path, content) in files {
            let full = checkout.join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(full, content).unwrap();
        }
        git(&checkout, &["add", "-A"]);
        git(&checkout, &["commit", "-q", "--allow-empty", "-m", "initial"]);
        git(&checkout, &["remote", "add", "origin", origin.to_str().unwrap()]);
        git(&checkout, &["push", "-q", "origin", "main"]);

        Self {
            _root: root,
            checkout,
            origin,
        }
    }

    pub fn origin_head(&self) -> String {
        git(&self.origin, &["rev-parse", "main"])
    }

    pub fn origin_commit_count(&self) -> usize {
        git(&self.origin, &["rev-list", "--count", "main"])
            .parse()
            .unwrap()
    }

    pub fn origin_last_message(&self) -> String {
        git(&self.origin, &["log", "-1", "--format=%s", "main"])
    }

    pub fn origin_files(&self) -> Vec<String> {
        git(&self.origin, &["ls-tree", "-r", "--name-only", "main"])
            .lines()
            .map(str::to_string)
            .collect()
    }
}

pub fn publisher() -> Publisher {
    Publisher::new(
        Duration::from_secs(10),
        Duration::from_secs(30),
        "Inception System",
        "incept@inception-system.local",
    )
}

pub fn settings(max_iterations: usize) -> RunnerSettings {
    RunnerSettings {
        defaults: ExecutionDefaults {
            mode: "api".into(),
            model: "test-model".into(),
        },
        max_tokens: 1024,
        max_iterations,
        tool_timeout: Duration::from_secs(10),
        system_prompt_path: None,
    }
}

/// 注册项目并返回 (lifecycle, project_id)
pub fn engine(checkout: &Path) -> (RequestLifecycle, ProjectId) {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let pid = store
        .add_project(&NewProject {
            name: "demo".into(),
            local_path: checkout.to_path_buf(),
            repo_branch: Some("main".into()),
            ..Default::default()
        })
        .unwrap();
    (RequestLifecycle::new(store), pid)
}

pub fn runner(lifecycle: &RequestLifecycle, llm: Arc<dyn LlmClient>, max_iterations: usize) -> RequestRunner {
    RequestRunner::new(lifecycle.clone(), llm, publisher(), settings(max_iterations))
}

/// 不落盘日志的 RunLog（挂在一个占位请求上）
pub fn scratch_log(lifecycle: &RequestLifecycle, pid: ProjectId) -> RunLog {
    let id = lifecycle.submit(NewRequest::new(pid, "scratch")).unwrap();
    RunLog::new(id, lifecycle.clone(), None)
}

/// 收集 tracing 输出的写入端
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// 在当前线程安装 DEBUG 级别的收集订阅器
pub fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    (logs, tracing::subscriber::set_default(subscriber))
}
