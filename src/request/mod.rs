//! 请求层：数据模型、生命周期管理、请求日志文件与日志扇出

pub mod journal;
pub mod lifecycle;
pub mod model;
pub mod run_log;

pub use journal::{RequestJournal, JOURNAL_DIR};
pub use lifecycle::RequestLifecycle;
pub use model::{
    resolve_profile, ExecutionDefaults, ExecutionMode, ExecutionProfile, LogEntry, LogLevel,
    NewProject, NewRequest, Project, ProjectId, Request, RequestId, RequestStatus,
    RestartOverrides,
};
pub use run_log::RunLog;
