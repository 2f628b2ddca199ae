//! Agent：续作上下文、提示词、工具调用主循环与请求执行器

pub mod continuation;
pub mod loop_;
pub mod prompt;
pub mod runner;

pub use continuation::build_continuation;
pub use loop_::{AgentLoop, LoopExit, LoopReport, LoopSettings};
pub use prompt::{build_user_message, load_system_prompt, DEFAULT_SYSTEM_PROMPT};
pub use runner::{commit_message, completion_summary, RequestRunner, RunnerSettings};
