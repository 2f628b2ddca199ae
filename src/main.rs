//! Incept - 无人值守的代码变更请求处理引擎
//!
//! 入口：初始化日志、加载配置，执行命令行子命令（默认 serve）。

mod cli;

use anyhow::Context;
use clap::Parser;

use cli::{Cli, Command};
use incept::config::load_config;
use incept::observability;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let args = Cli::parse();
    let cfg = load_config(args.config.clone()).context("Failed to load configuration")?;

    cli::run(args.command.unwrap_or(Command::Serve), cfg).await
}
