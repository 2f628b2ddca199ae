//! 请求日志文件
//!
//! 每个请求在检出目录下有一份只追加的文本日志 `inception_logs/request_<id>.log`：
//! 头部（请求 ID、项目、开始时间）、每个事件一行、尾部（最终状态、完成时间）。
//! 写文件失败只记 warn，不影响请求执行。

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::request::{LogLevel, RequestId, RequestStatus};

/// 日志文件所在的检出子目录
pub const JOURNAL_DIR: &str = "inception_logs";

const RULE: &str = "============================================================";

#[derive(Debug, Clone)]
pub struct RequestJournal {
    path: PathBuf,
    relative: PathBuf,
}

impl RequestJournal {
    /// 创建（覆盖）日志文件并写入头部
    pub fn start(checkout: &Path, request_id: RequestId, project_name: &str, text: &str) -> Self {
        let relative = Self::relative_path_for(request_id);
        let journal = Self {
            path: checkout.join(&relative),
            relative,
        };
        let header = format!(
            "{RULE}\nIncept Request #{request_id}\nProject: {project_name}\nStarted: {}\nRequest: {text}\n{RULE}\n",
            timestamp()
        );
        if let Some(dir) = journal.path.parent() {
            if let Err(e) = fs::create_dir_all(dir) {
                tracing::warn!(path = %dir.display(), error = %e, "Cannot create journal directory");
            }
        }
        if let Err(e) = fs::write(&journal.path, header) {
            tracing::warn!(path = %journal.path.display(), error = %e, "Cannot write request journal");
        }
        journal
    }

    /// 续写已有日志文件（不写头部），用于手动发布等后续操作
    pub fn resume(checkout: &Path, request_id: RequestId) -> Self {
        let relative = Self::relative_path_for(request_id);
        Self {
            path: checkout.join(&relative),
            relative,
        }
    }

    /// 检出根目录下的相对路径
    pub fn relative_path_for(request_id: RequestId) -> PathBuf {
        Path::new(JOURNAL_DIR).join(format!("request_{request_id}.log"))
    }

    pub fn relative_path(&self) -> &Path {
        &self.relative
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, level: LogLevel, message: &str) {
        let line = format!(
            "[{}] [{}] {}\n",
            timestamp(),
            level.as_str().to_ascii_uppercase(),
            message
        );
        self.write(&line);
    }

    /// 写入尾部
    pub fn finish(&self, status: RequestStatus) {
        let footer = format!(
            "{RULE}\nFinal status: {status}\nCompleted: {}\n{RULE}\n",
            timestamp()
        );
        self.write(&footer);
    }

    fn write(&self, text: &str) {
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| f.write_all(text.as_bytes()));
        if let Err(e) = result {
            tracing::warn!(path = %self.path.display(), error = %e, "Cannot append to request journal");
        }
    }
}

fn timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string()
}
