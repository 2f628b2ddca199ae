//! 请求事件扇出：一条事件同时写入数据库日志表、请求日志文件与 tracing
//!
//! 任何一路写失败都只降级为 tracing::warn，执行流程不因日志而中断。

use crate::request::{LogLevel, RequestId, RequestJournal, RequestLifecycle};

#[derive(Clone)]
pub struct RunLog {
    request_id: RequestId,
    lifecycle: RequestLifecycle,
    journal: Option<RequestJournal>,
}

impl RunLog {
    pub fn new(
        request_id: RequestId,
        lifecycle: RequestLifecycle,
        journal: Option<RequestJournal>,
    ) -> Self {
        Self {
            request_id,
            lifecycle,
            journal,
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn log(&self, level: LogLevel, message: impl AsRef<str>) {
        let message = message.as_ref();
        let request_id = self.request_id;
        match level {
            LogLevel::Debug => tracing::debug!(request_id, "{}", message),
            LogLevel::Info | LogLevel::Success => tracing::info!(request_id, level = %level, "{}", message),
            LogLevel::Warning => tracing::warn!(request_id, "{}", message),
            LogLevel::Error => tracing::error!(request_id, "{}", message),
        }
        if let Err(e) = self.lifecycle.log(request_id, level, message) {
            tracing::warn!(request_id, error = %e, "Failed to persist request log");
        }
        if let Some(journal) = &self.journal {
            journal.append(level, message);
        }
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Info, message);
    }

    pub fn success(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Success, message);
    }

    pub fn warning(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, message);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::request::{NewProject, NewRequest};
    use crate::store::Store;

    #[test]
    fn test_event_reaches_store_and_journal() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open_in_memory().unwrap());
        let pid = store
            .add_project(&NewProject {
                name: "demo".into(),
                local_path: dir.path().to_path_buf(),
                ..Default::default()
            })
            .unwrap();
        let lifecycle = RequestLifecycle::new(store);
        let id = lifecycle.submit(NewRequest::new(pid, "x")).unwrap();
        let journal = RequestJournal::start(dir.path(), id, "demo", "x");
        let log = RunLog::new(id, lifecycle.clone(), Some(journal.clone()));

        log.info("reading files");
        log.success("done");

        let entries = lifecycle.logs(id).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].level, LogLevel::Success);
        let text = std::fs::read_to_string(journal.path()).unwrap();
        assert!(text.contains("[INFO] reading files"));
    }

    #[test]
    fn test_missing_request_does_not_fail() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let log = RunLog::new(99, RequestLifecycle::new(store), None);
        // 外键约束拒绝写入，只产生 warn
        log.error("orphan");
    }
}
