//! Incept - 无人值守的代码变更请求处理引擎
//!
//! 模块划分：
//! - **agent**: 续作上下文、提示词、工具调用主循环、请求执行器
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型与优雅关闭
//! - **dispatcher**: 单消费者轮询调度
//! - **git**: git 子进程与版本控制发布
//! - **llm**: 模型客户端抽象与实现（Anthropic / 脚本化 Mock）
//! - **observability**: 日志初始化
//! - **request**: 请求数据模型、生命周期、日志扇出
//! - **store**: SQLite 持久化
//! - **tools**: 工具目录、检出目录沙箱与执行器

pub mod agent;
pub mod config;
pub mod core;
pub mod dispatcher;
pub mod git;
pub mod llm;
pub mod observability;
pub mod request;
pub mod store;
pub mod tools;

pub use agent::{RequestRunner, RunnerSettings};
pub use dispatcher::{Dispatcher, TickOutcome};
pub use request::RequestLifecycle;
pub use store::Store;
