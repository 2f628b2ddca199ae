//! Git：带超时的子进程调用与变更发布

pub mod command;
pub mod publisher;

pub use command::{redact, Git, GitError, GitOutput};
pub use publisher::{
    authenticated_url, PublishError, PublishErrorKind, PublishOutcome, PublishStage,
    PublishTarget, Publisher,
};
