//! SQLite 持久化：项目、请求、请求日志、项目级处理器设置
//!
//! 单连接 + Mutex；所有方法同步且不跨 await 持锁。状态迁移都是带条件的 UPDATE
//! （`WHERE status IN (...)`），即比较并交换，多进程共享同一数据库时也不会重复认领。

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};

use crate::core::InceptError;
use crate::request::{
    LogEntry, LogLevel, NewProject, NewRequest, Project, ProjectId, Request, RequestId,
    RequestStatus,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    local_path TEXT NOT NULL,
    repo_url TEXT,
    repo_branch TEXT NOT NULL DEFAULT 'main',
    github_token TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL,
    text TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    response TEXT,
    mode TEXT,
    model TEXT,
    parent_id INTEGER,
    auto_push INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    completed_at TEXT,
    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS request_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    request_id INTEGER NOT NULL,
    level TEXT NOT NULL DEFAULT 'info',
    message TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    FOREIGN KEY (request_id) REFERENCES requests(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS processor_settings (
    project_id INTEGER PRIMARY KEY,
    mode TEXT,
    model TEXT,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_requests_project ON requests(project_id);
CREATE INDEX IF NOT EXISTS idx_requests_status ON requests(status);
CREATE INDEX IF NOT EXISTS idx_logs_request ON request_logs(request_id);
";

const PROJECT_COLUMNS: &str = "p.id, p.name, p.local_path, p.repo_url, p.repo_branch, p.github_token,
     s.mode AS default_mode, s.model AS default_model";

const REQUEST_COLUMNS: &str = "id, project_id, text, status, response, mode, model, parent_id,
     auto_push, created_at, completed_at";

/// 引擎的持久化后端
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// 打开（或创建）数据库文件；父目录不存在时自动创建
    pub fn open(path: impl AsRef<Path>) -> Result<Self, InceptError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    InceptError::Config(format!(
                        "cannot create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, InceptError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, InceptError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // 持锁线程 panic 不会破坏 SQLite 连接本身，继续使用
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ==================== PROJECTS ====================

    pub fn add_project(&self, project: &NewProject) -> Result<ProjectId, InceptError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO projects (name, local_path, repo_url, repo_branch, github_token, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                project.name,
                project.local_path.to_string_lossy(),
                project.repo_url,
                project.repo_branch.as_deref().unwrap_or("main"),
                project.access_token,
                Utc::now(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_project(&self, id: ProjectId) -> Result<Option<Project>, InceptError> {
        let sql = format!(
            "SELECT {PROJECT_COLUMNS} FROM projects p
             LEFT JOIN processor_settings s ON s.project_id = p.id
             WHERE p.id = ?1"
        );
        Ok(self
            .conn()
            .query_row(&sql, params![id], project_from_row)
            .optional()?)
    }

    pub fn get_project_by_name(&self, name: &str) -> Result<Option<Project>, InceptError> {
        let sql = format!(
            "SELECT {PROJECT_COLUMNS} FROM projects p
             LEFT JOIN processor_settings s ON s.project_id = p.id
             WHERE p.name = ?1"
        );
        Ok(self
            .conn()
            .query_row(&sql, params![name], project_from_row)
            .optional()?)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>, InceptError> {
        let sql = format!(
            "SELECT {PROJECT_COLUMNS} FROM projects p
             LEFT JOIN processor_settings s ON s.project_id = p.id
             ORDER BY p.name ASC"
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], project_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// 保存项目级默认模式 / 模型（覆盖旧值）
    pub fn save_settings(
        &self,
        project_id: ProjectId,
        mode: Option<&str>,
        model: Option<&str>,
    ) -> Result<(), InceptError> {
        self.conn().execute(
            "INSERT OR REPLACE INTO processor_settings (project_id, mode, model, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![project_id, mode, model, Utc::now()],
        )?;
        Ok(())
    }

    // ==================== REQUESTS ====================

    pub fn insert_request(&self, request: &NewRequest) -> Result<RequestId, InceptError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO requests (project_id, text, status, mode, model, parent_id, auto_push, created_at)
             VALUES (?1, ?2, 'pending', ?3, ?4, ?5, ?6, ?7)",
            params![
                request.project_id,
                request.text,
                request.mode,
                request.model,
                request.parent_id,
                request.auto_push,
                Utc::now(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_request(&self, id: RequestId) -> Result<Option<Request>, InceptError> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = ?1");
        Ok(self
            .conn()
            .query_row(&sql, params![id], request_from_row)
            .optional()?)
    }

    pub fn status_of(&self, id: RequestId) -> Result<Option<RequestStatus>, InceptError> {
        let raw: Option<String> = self
            .conn()
            .query_row(
                "SELECT status FROM requests WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|s| s.parse()).transpose()
    }

    /// 最近的请求（新到旧），可按项目过滤
    pub fn list_requests(
        &self,
        project_id: Option<ProjectId>,
        limit: usize,
    ) -> Result<Vec<Request>, InceptError> {
        let conn = self.conn();
        let limit = limit as i64;
        let requests = match project_id {
            Some(pid) => {
                let sql = format!(
                    "SELECT {REQUEST_COLUMNS} FROM requests WHERE project_id = ?1
                     ORDER BY created_at DESC, id DESC LIMIT ?2"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![pid, limit], request_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let sql = format!(
                    "SELECT {REQUEST_COLUMNS} FROM requests
                     ORDER BY created_at DESC, id DESC LIMIT ?1"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![limit], request_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(requests)
    }

    /// 认领全系统最早的 pending 请求并置为 processing；没有则返回 None
    pub fn claim_oldest_pending(&self) -> Result<Option<Request>, InceptError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let candidate: Option<RequestId> = tx
            .query_row(
                "SELECT id FROM requests WHERE status = 'pending'
                 ORDER BY created_at ASC, id ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let Some(id) = candidate else {
            return Ok(None);
        };
        let updated = tx.execute(
            "UPDATE requests SET status = 'processing' WHERE id = ?1 AND status = 'pending'",
            params![id],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = ?1");
        let request = tx.query_row(&sql, params![id], request_from_row)?;
        tx.commit()?;
        Ok(Some(request))
    }

    /// 条件迁移到终态：仅当当前状态属于 `from` 时生效，同时写入完成时间；
    /// `response` 为 None 时保留原值。返回是否发生了迁移。
    pub fn transition_terminal(
        &self,
        id: RequestId,
        from: &[RequestStatus],
        to: RequestStatus,
        response: Option<&str>,
    ) -> Result<bool, InceptError> {
        if !to.is_terminal() || from.is_empty() {
            return Err(InceptError::InvalidValue(format!(
                "terminal transition to {to} from {from:?}"
            )));
        }
        let placeholders = vec!["?"; from.len()].join(", ");
        let sql = format!(
            "UPDATE requests SET status = ?, response = COALESCE(?, response), completed_at = ?
             WHERE id = ? AND status IN ({placeholders})"
        );
        let now = Utc::now();
        let to_str = to.as_str();
        let from_strs: Vec<&str> = from.iter().map(|s| s.as_str()).collect();
        let mut values: Vec<&dyn ToSql> = vec![&to_str, &response, &now, &id];
        for s in &from_strs {
            values.push(s);
        }
        let updated = self.conn().execute(&sql, values.as_slice())?;
        Ok(updated > 0)
    }

    // ==================== LOGS ====================

    pub fn append_log(
        &self,
        request_id: RequestId,
        level: LogLevel,
        message: &str,
    ) -> Result<i64, InceptError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO request_logs (request_id, level, message, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![request_id, level.as_str(), message, Utc::now()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 请求的全部日志，按追加顺序
    pub fn list_logs(&self, request_id: RequestId) -> Result<Vec<LogEntry>, InceptError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, request_id, level, message, timestamp FROM request_logs
             WHERE request_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![request_id], |row| {
            Ok(LogEntry {
                id: row.get("id")?,
                request_id: row.get("request_id")?,
                level: parse_column(row, "level")?,
                message: row.get("message")?,
                timestamp: row.get::<_, DateTime<Utc>>("timestamp")?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn parse_column<T>(row: &Row<'_>, column: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = InceptError>,
{
    let raw: String = row.get(column)?;
    raw.parse().map_err(|e: InceptError| {
        let idx = row.as_ref().column_index(column).unwrap_or(0);
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
    })
}

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get("id")?,
        name: row.get("name")?,
        local_path: row.get::<_, String>("local_path")?.into(),
        repo_url: row.get("repo_url")?,
        repo_branch: row.get("repo_branch")?,
        access_token: row.get("github_token")?,
        default_mode: row.get("default_mode")?,
        default_model: row.get("default_model")?,
    })
}

fn request_from_row(row: &Row<'_>) -> rusqlite::Result<Request> {
    Ok(Request {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        text: row.get("text")?,
        status: parse_column(row, "status")?,
        response: row.get("response")?,
        mode: row.get("mode")?,
        model: row.get("model")?,
        parent_id: row.get("parent_id")?,
        auto_push: row.get("auto_push")?,
        created_at: row.get("created_at")?,
        completed_at: row.get("completed_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_project() -> (Store, ProjectId) {
        let store = Store::open_in_memory().unwrap();
        let pid = store
            .add_project(&NewProject {
                name: "demo".into(),
                local_path: "/tmp/demo".into(),
                ..Default::default()
            })
            .unwrap();
        (store, pid)
    }

    #[test]
    fn test_project_settings_join() {
        let (store, pid) = store_with_project();
        let p = store.get_project(pid).unwrap().unwrap();
        assert_eq!(p.repo_branch, "main");
        assert!(p.default_model.is_none());

        store.save_settings(pid, Some("api"), Some("m-1")).unwrap();
        store.save_settings(pid, Some("api"), Some("m-2")).unwrap();
        let p = store.get_project_by_name("demo").unwrap().unwrap();
        assert_eq!(p.default_model.as_deref(), Some("m-2"));
        assert_eq!(store.list_projects().unwrap().len(), 1);
    }

    #[test]
    fn test_claim_takes_oldest_and_only_once() {
        let (store, pid) = store_with_project();
        let first = store.insert_request(&NewRequest::new(pid, "first")).unwrap();
        let second = store.insert_request(&NewRequest::new(pid, "second")).unwrap();

        let claimed = store.claim_oldest_pending().unwrap().unwrap();
        assert_eq!(claimed.id, first);
        assert_eq!(claimed.status, RequestStatus::Processing);

        let claimed = store.claim_oldest_pending().unwrap().unwrap();
        assert_eq!(claimed.id, second);
        assert!(store.claim_oldest_pending().unwrap().is_none());
    }

    #[test]
    fn test_transition_terminal_is_conditional() {
        let (store, pid) = store_with_project();
        let id = store.insert_request(&NewRequest::new(pid, "x")).unwrap();

        // pending 不能直接 completed
        assert!(!store
            .transition_terminal(id, &[RequestStatus::Processing], RequestStatus::Completed, Some("r"))
            .unwrap());

        store.claim_oldest_pending().unwrap();
        assert!(store
            .transition_terminal(id, &[RequestStatus::Processing], RequestStatus::Completed, Some("done"))
            .unwrap());
        let req = store.get_request(id).unwrap().unwrap();
        assert_eq!(req.status, RequestStatus::Completed);
        assert_eq!(req.response.as_deref(), Some("done"));
        assert!(req.completed_at.is_some());

        assert!(!store
            .transition_terminal(id, &[RequestStatus::Processing], RequestStatus::Error, None)
            .unwrap());
        assert_eq!(store.status_of(id).unwrap(), Some(RequestStatus::Completed));
    }

    #[test]
    fn test_logs_keep_append_order() {
        let (store, pid) = store_with_project();
        let id = store.insert_request(&NewRequest::new(pid, "x")).unwrap();
        for i in 0..5 {
            store.append_log(id, LogLevel::Info, &format!("line {i}")).unwrap();
        }
        store.append_log(id, LogLevel::Success, "done").unwrap();
        let logs = store.list_logs(id).unwrap();
        assert_eq!(logs.len(), 6);
        assert_eq!(logs[0].message, "line 0");
        assert_eq!(logs[5].level, LogLevel::Success);
    }

    #[test]
    fn test_list_requests_newest_first() {
        let (store, pid) = store_with_project();
        let a = store.insert_request(&NewRequest::new(pid, "a")).unwrap();
        let b = store.insert_request(&NewRequest::new(pid, "b")).unwrap();
        let listed = store.list_requests(Some(pid), 10).unwrap();
        assert_eq!(listed.iter().map(|r| r.id).collect::<Vec<_>>(), vec![b, a]);
        assert_eq!(store.list_requests(None, 1).unwrap().len(), 1);
    }
}
