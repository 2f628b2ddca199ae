//! 请求生命周期管理
//!
//! 状态机的唯一写入方：submit / cancel / restart 面向操作者，claim_next / finalize 面向调度器与执行器。
//! finalize 是比较并交换：只有仍处于 processing 的请求才会进入终态，已取消的请求不会被覆盖。

use std::sync::Arc;

use crate::core::InceptError;
use crate::request::{
    LogEntry, LogLevel, NewRequest, Project, ProjectId, Request, RequestId, RequestStatus,
    RestartOverrides,
};
use crate::store::Store;

#[derive(Clone)]
pub struct RequestLifecycle {
    store: Arc<Store>,
}

impl RequestLifecycle {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// 创建 pending 请求
    pub fn submit(&self, new: NewRequest) -> Result<RequestId, InceptError> {
        if new.text.trim().is_empty() {
            return Err(InceptError::InvalidValue("request text is empty".into()));
        }
        self.require_project(new.project_id)?;

        if let Some(parent_id) = new.parent_id {
            let parent = self
                .store
                .get_request(parent_id)?
                .ok_or(InceptError::RequestNotFound(parent_id))?;
            if parent.project_id != new.project_id {
                return Err(InceptError::InvalidValue(format!(
                    "parent request #{} belongs to another project",
                    parent_id
                )));
            }
        }

        let id = self.store.insert_request(&new)?;
        tracing::info!(
            request_id = id,
            project_id = new.project_id,
            parent_id = ?new.parent_id,
            auto_push = new.auto_push,
            "Request submitted"
        );
        Ok(id)
    }

    /// pending | processing -> cancelled；其它状态不变。返回是否发生迁移。
    ///
    /// 对 processing 请求只改状态，执行中的循环会在下一次模型调用前发现并提前退出。
    pub fn cancel(&self, id: RequestId) -> Result<bool, InceptError> {
        if self.store.status_of(id)?.is_none() {
            return Err(InceptError::RequestNotFound(id));
        }
        let cancelled = self.store.transition_terminal(
            id,
            &[RequestStatus::Pending, RequestStatus::Processing],
            RequestStatus::Cancelled,
            None,
        )?;
        if cancelled {
            self.store
                .append_log(id, LogLevel::Warning, "Request cancelled")?;
            tracing::info!(request_id = id, "Request cancelled");
        }
        Ok(cancelled)
    }

    /// 以 `id` 为父请求创建新请求；原请求不变。源请求不存在时返回 None。
    pub fn restart(
        &self,
        id: RequestId,
        overrides: RestartOverrides,
    ) -> Result<Option<RequestId>, InceptError> {
        let Some(source) = self.store.get_request(id)? else {
            return Ok(None);
        };
        let new = NewRequest {
            project_id: source.project_id,
            text: overrides.text.unwrap_or(source.text),
            mode: overrides.mode.or(source.mode),
            model: overrides.model.or(source.model),
            parent_id: Some(source.id),
            auto_push: overrides.auto_push.unwrap_or(source.auto_push),
        };
        let new_id = self.submit(new)?;
        tracing::info!(request_id = new_id, parent_id = id, "Request restarted");
        Ok(Some(new_id))
    }

    /// 认领最早的 pending 请求
    pub fn claim_next(&self) -> Result<Option<Request>, InceptError> {
        let claimed = self.store.claim_oldest_pending()?;
        if let Some(request) = &claimed {
            tracing::info!(
                request_id = request.id,
                project_id = request.project_id,
                "Request claimed"
            );
        }
        Ok(claimed)
    }

    /// processing -> completed | error，同时写入 response 与完成时间
    ///
    /// 请求已不在 processing（被取消或已终态）时返回 InvalidTransition，不做任何修改。
    pub fn finalize(
        &self,
        id: RequestId,
        status: RequestStatus,
        response: &str,
    ) -> Result<(), InceptError> {
        if !RequestStatus::Processing.can_transition_to(status) || status == RequestStatus::Cancelled
        {
            return Err(InceptError::InvalidTransition {
                id,
                from: RequestStatus::Processing,
                to: status,
            });
        }
        let updated = self.store.transition_terminal(
            id,
            &[RequestStatus::Processing],
            status,
            Some(response),
        )?;
        if updated {
            return Ok(());
        }
        match self.store.status_of(id)? {
            Some(from) => Err(InceptError::InvalidTransition { id, from, to: status }),
            None => Err(InceptError::RequestNotFound(id)),
        }
    }

    pub fn log(&self, id: RequestId, level: LogLevel, message: &str) -> Result<(), InceptError> {
        self.store.append_log(id, level, message)?;
        Ok(())
    }

    pub fn get(&self, id: RequestId) -> Result<Option<Request>, InceptError> {
        self.store.get_request(id)
    }

    pub fn logs(&self, id: RequestId) -> Result<Vec<LogEntry>, InceptError> {
        self.store.list_logs(id)
    }

    /// 执行中的请求是否已被取消（或已被其它方终结）
    pub fn is_cancelled(&self, id: RequestId) -> Result<bool, InceptError> {
        Ok(matches!(
            self.store.status_of(id)?,
            Some(RequestStatus::Cancelled)
        ))
    }

    pub fn project(&self, id: ProjectId) -> Result<Option<Project>, InceptError> {
        self.store.get_project(id)
    }

    fn require_project(&self, id: ProjectId) -> Result<Project, InceptError> {
        self.store
            .get_project(id)?
            .ok_or_else(|| InceptError::ProjectNotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::NewProject;

    fn lifecycle() -> (RequestLifecycle, ProjectId) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let pid = store
            .add_project(&NewProject {
                name: "demo".into(),
                local_path: "/tmp/demo".into(),
                ..Default::default()
            })
            .unwrap();
        (RequestLifecycle::new(store), pid)
    }

    #[test]
    fn test_submit_requires_project_and_text() {
        let (lc, pid) = lifecycle();
        assert!(matches!(
            lc.submit(NewRequest::new(pid + 100, "x")),
            Err(InceptError::ProjectNotFound(_))
        ));
        assert!(matches!(
            lc.submit(NewRequest::new(pid, "   ")),
            Err(InceptError::InvalidValue(_))
        ));
        let id = lc.submit(NewRequest::new(pid, "add a README")).unwrap();
        assert_eq!(lc.get(id).unwrap().unwrap().status, RequestStatus::Pending);
    }

    #[test]
    fn test_cancel_pending_then_completed_is_noop() {
        let (lc, pid) = lifecycle();
        let pending = lc.submit(NewRequest::new(pid, "a")).unwrap();
        assert!(lc.cancel(pending).unwrap());
        let req = lc.get(pending).unwrap().unwrap();
        assert_eq!(req.status, RequestStatus::Cancelled);
        assert!(req.completed_at.is_some());

        let done = lc.submit(NewRequest::new(pid, "b")).unwrap();
        lc.claim_next().unwrap().unwrap();
        lc.finalize(done, RequestStatus::Completed, "ok").unwrap();
        assert!(!lc.cancel(done).unwrap());
        assert_eq!(lc.get(done).unwrap().unwrap().status, RequestStatus::Completed);

        assert!(matches!(lc.cancel(9999), Err(InceptError::RequestNotFound(9999))));
    }

    #[test]
    fn test_finalize_after_cancel_is_rejected() {
        let (lc, pid) = lifecycle();
        let id = lc.submit(NewRequest::new(pid, "a")).unwrap();
        lc.claim_next().unwrap();
        assert!(lc.cancel(id).unwrap());
        assert!(lc.is_cancelled(id).unwrap());

        let err = lc.finalize(id, RequestStatus::Completed, "late").unwrap_err();
        assert!(matches!(
            err,
            InceptError::InvalidTransition {
                from: RequestStatus::Cancelled,
                to: RequestStatus::Completed,
                ..
            }
        ));
        let req = lc.get(id).unwrap().unwrap();
        assert_eq!(req.status, RequestStatus::Cancelled);
        assert!(req.response.is_none());
    }

    #[test]
    fn test_finalize_only_once() {
        let (lc, pid) = lifecycle();
        let id = lc.submit(NewRequest::new(pid, "a")).unwrap();
        lc.claim_next().unwrap();
        lc.finalize(id, RequestStatus::Error, "boom").unwrap();
        assert!(lc.finalize(id, RequestStatus::Completed, "ok").is_err());
        assert!(lc.finalize(id, RequestStatus::Pending, "no").is_err());
        assert_eq!(lc.get(id).unwrap().unwrap().response.as_deref(), Some("boom"));
    }

    #[test]
    fn test_restart_copies_fields_and_links_parent() {
        let (lc, pid) = lifecycle();
        let source = lc
            .submit(
                NewRequest::new(pid, "rename foo")
                    .with_mode("api")
                    .with_model("m-1")
                    .with_auto_push(false),
            )
            .unwrap();

        let copy = lc.restart(source, RestartOverrides::default()).unwrap().unwrap();
        let copied = lc.get(copy).unwrap().unwrap();
        assert_eq!(copied.text, "rename foo");
        assert_eq!(copied.mode.as_deref(), Some("api"));
        assert_eq!(copied.model.as_deref(), Some("m-1"));
        assert!(!copied.auto_push);
        assert_eq!(copied.parent_id, Some(source));
        assert_eq!(copied.project_id, pid);

        let tweaked = lc
            .restart(
                source,
                RestartOverrides {
                    model: Some("m-2".into()),
                    auto_push: Some(true),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        let tweaked = lc.get(tweaked).unwrap().unwrap();
        assert_eq!(tweaked.model.as_deref(), Some("m-2"));
        assert!(tweaked.auto_push);

        // 原请求不变
        assert_eq!(lc.get(source).unwrap().unwrap().status, RequestStatus::Pending);
        assert!(lc.restart(4242, RestartOverrides::default()).unwrap().is_none());
    }
}
