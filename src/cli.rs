//! 运维命令行
//!
//! `incept` 不带子命令时等同 `incept serve`。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use incept::agent::{RequestRunner, RunnerSettings};
use incept::config::AppConfig;
use incept::core::ShutdownManager;
use incept::dispatcher::{Dispatcher, TickOutcome};
use incept::git::{PublishOutcome, Publisher};
use incept::llm::AnthropicClient;
use incept::request::{NewProject, NewRequest, Project, RequestLifecycle, RestartOverrides};
use incept::store::Store;

#[derive(Debug, Parser)]
#[command(name = "incept", version, about = "Unattended code-change request processor")]
pub struct Cli {
    /// 额外的配置文件（覆盖 config/default.toml）
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the dispatcher until Ctrl-C / SIGTERM
    Serve,
    /// Process at most one pending request and exit
    RunOnce,
    /// Manage projects
    #[command(subcommand)]
    Project(ProjectCommand),
    /// Set per-project default mode and model
    Settings {
        project: String,
        mode: String,
        model: String,
    },
    /// Submit a new request
    Submit {
        project: String,
        text: String,
        #[arg(long)]
        mode: Option<String>,
        #[arg(long)]
        model: Option<String>,
        /// Keep changes local; push later with `incept push`
        #[arg(long)]
        no_push: bool,
    },
    /// Cancel a pending or processing request
    Cancel { id: i64 },
    /// Create a new request continuing from an earlier one
    Restart {
        id: i64,
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        mode: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long, conflicts_with = "no_push")]
        push: bool,
        #[arg(long)]
        no_push: bool,
    },
    /// List recent requests, newest first
    List {
        /// Project name or id
        #[arg(long)]
        project: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show a request and its log
    Status { id: i64 },
    /// Publish a completed request's changes
    Push { id: i64 },
}

#[derive(Debug, Subcommand)]
pub enum ProjectCommand {
    Add {
        name: String,
        path: PathBuf,
        #[arg(long)]
        repo: Option<String>,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        token: Option<String>,
    },
    List,
}

pub async fn run(command: Command, cfg: AppConfig) -> anyhow::Result<()> {
    let store = Arc::new(
        Store::open(cfg.app.database_path()).context("Failed to open database")?,
    );
    let lifecycle = RequestLifecycle::new(Arc::clone(&store));

    match command {
        Command::Serve => {
            let dispatcher = Dispatcher::new(build_runner(&cfg, lifecycle)?, cfg.processor.poll_interval());
            let shutdown = Arc::new(ShutdownManager::new());
            shutdown.install_signal_handlers();
            tracing::info!(
                database = %cfg.app.database_path().display(),
                model = %cfg.llm.model,
                "Incept processor starting"
            );
            dispatcher.run(shutdown.token()).await;
        }
        Command::RunOnce => {
            let dispatcher = Dispatcher::new(build_runner(&cfg, lifecycle)?, cfg.processor.poll_interval());
            match dispatcher.tick().await.context("Dispatcher tick failed")? {
                TickOutcome::Processed { request_id, status } => {
                    println!("Request #{} finished: {}", request_id, status)
                }
                TickOutcome::Idle | TickOutcome::Busy => println!("No pending requests"),
            }
        }
        Command::Project(ProjectCommand::Add {
            name,
            path,
            repo,
            branch,
            token,
        }) => {
            let local_path = std::fs::canonicalize(&path)
                .with_context(|| format!("Checkout not found: {}", path.display()))?;
            let id = store.add_project(&NewProject {
                name: name.clone(),
                local_path,
                repo_url: repo,
                repo_branch: branch,
                access_token: token,
            })?;
            println!("Project #{} added: {}", id, name);
        }
        Command::Project(ProjectCommand::List) => {
            for p in store.list_projects()? {
                println!(
                    "#{} {} {} [{}] mode={} model={}",
                    p.id,
                    p.name,
                    p.local_path.display(),
                    p.repo_branch,
                    p.default_mode.as_deref().unwrap_or("-"),
                    p.default_model.as_deref().unwrap_or("-"),
                );
            }
        }
        Command::Settings {
            project,
            mode,
            model,
        } => {
            let p = find_project(&store, &project)?;
            store.save_settings(p.id, Some(&mode), Some(&model))?;
            println!("Settings saved for {}: mode={} model={}", p.name, mode, model);
        }
        Command::Submit {
            project,
            text,
            mode,
            model,
            no_push,
        } => {
            let p = find_project(&store, &project)?;
            let mut new = NewRequest::new(p.id, text).with_auto_push(!no_push);
            new.mode = mode;
            new.model = model;
            let id = lifecycle.submit(new)?;
            println!("Request #{} queued for {}", id, p.name);
        }
        Command::Cancel { id } => {
            if lifecycle.cancel(id)? {
                println!("Request #{} cancelled", id);
            } else {
                println!("Request #{} already finished; nothing to cancel", id);
            }
        }
        Command::Restart {
            id,
            text,
            mode,
            model,
            push,
            no_push,
        } => {
            let auto_push = match (push, no_push) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let overrides = RestartOverrides {
                text,
                mode,
                model,
                auto_push,
            };
            match lifecycle.restart(id, overrides)? {
                Some(new_id) => println!("Request #{} queued (continues #{})", new_id, id),
                None => bail!("Request #{} not found", id),
            }
        }
        Command::List { project, limit } => {
            let project_id = match project {
                Some(key) => Some(find_project(&store, &key)?.id),
                None => None,
            };
            for r in store.list_requests(project_id, limit)? {
                let head: String = r.text.chars().take(60).collect();
                println!(
                    "#{} [{}] project={} {} {}",
                    r.id,
                    r.status,
                    r.project_id,
                    r.created_at.format("%Y-%m-%d %H:%M"),
                    head
                );
            }
        }
        Command::Status { id } => {
            let Some(r) = lifecycle.get(id)? else {
                bail!("Request #{} not found", id);
            };
            println!("Request #{} [{}]", r.id, r.status);
            println!("Text: {}", r.text);
            if let Some(parent) = r.parent_id {
                println!("Continues: #{}", parent);
            }
            println!("Created: {}", r.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
            if let Some(done) = r.completed_at {
                println!("Completed: {}", done.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            for entry in lifecycle.logs(id)? {
                println!(
                    "[{}] [{}] {}",
                    entry.timestamp.format("%H:%M:%S"),
                    entry.level.as_str().to_ascii_uppercase(),
                    entry.message
                );
            }
            if let Some(response) = r.response {
                println!("\n{}", response);
            }
        }
        Command::Push { id } => {
            let runner = build_runner(&cfg, lifecycle)?;
            match runner.publish_request(id).await? {
                PublishOutcome::NothingToCommit => println!("Nothing to push for #{}", id),
                PublishOutcome::Pushed {
                    commit, refspec, ..
                } => println!("Pushed {} to {}", commit, refspec),
            }
        }
    }
    Ok(())
}

fn build_runner(cfg: &AppConfig, lifecycle: RequestLifecycle) -> anyhow::Result<RequestRunner> {
    let llm = AnthropicClient::from_config(&cfg.llm).context("Failed to create LLM client")?;
    Ok(RequestRunner::new(
        lifecycle,
        Arc::new(llm),
        Publisher::from_config(&cfg.git),
        RunnerSettings::from_config(cfg),
    ))
}

/// 按名称或数字 ID 查找项目
fn find_project(store: &Store, key: &str) -> anyhow::Result<Project> {
    if let Some(p) = store.get_project_by_name(key)? {
        return Ok(p);
    }
    if let Ok(id) = key.parse::<i64>() {
        if let Some(p) = store.get_project(id)? {
            return Ok(p);
        }
    }
    bail!("Project not found: {}", key)
}
