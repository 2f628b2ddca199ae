//! 续作上下文
//!
//! 重启的请求带 parent_id：把父请求的终态、最后 10 条日志与结果摘要的前 1000 字符拼成一段文本，
//! 附在新对话的首条用户消息里，避免模型重复已完成的工作。

use crate::request::{Request, RequestLifecycle};

/// 最多带入的父请求日志条数
pub const MAX_PARENT_LOGS: usize = 10;
/// 父请求结果摘要的最大字符数
pub const MAX_PARENT_RESPONSE_CHARS: usize = 1000;

/// 没有父请求或父请求不存在时返回空串
pub fn build_continuation(lifecycle: &RequestLifecycle, request: &Request) -> String {
    let Some(parent_id) = request.parent_id else {
        return String::new();
    };
    let parent = match lifecycle.get(parent_id) {
        Ok(Some(parent)) => parent,
        Ok(None) => return String::new(),
        Err(e) => {
            tracing::warn!(request_id = request.id, parent_id, error = %e, "Cannot load parent request");
            return String::new();
        }
    };

    let mut parts = vec![
        "\n=== PREVIOUS ATTEMPT CONTEXT ===".to_string(),
        format!("\nPrevious request #{}:", parent_id),
        format!("Status: {}", parent.status),
    ];

    let logs = lifecycle.logs(parent_id).unwrap_or_default();
    if !logs.is_empty() {
        parts.push("\nProgress log from previous attempt:".to_string());
        let skip = logs.len().saturating_sub(MAX_PARENT_LOGS);
        for entry in &logs[skip..] {
            parts.push(format!("  [{}] {}", entry.level, entry.message));
        }
    }

    if let Some(response) = parent.response.as_deref().filter(|r| !r.is_empty()) {
        let head: String = response.chars().take(MAX_PARENT_RESPONSE_CHARS).collect();
        parts.push(format!("\nPrevious result summary:\n{}", head));
    }

    parts.push("\n=== END PREVIOUS CONTEXT ===\n".to_string());
    parts.push(
        "Continue from where the previous attempt left off. Avoid repeating completed work."
            .to_string(),
    );
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::request::{LogLevel, NewProject, NewRequest, RequestStatus, RestartOverrides};
    use crate::store::Store;

    fn setup() -> (RequestLifecycle, i64) {
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
    fn test_no_parent_is_empty() {
        let (lc, pid) = setup();
        let id = lc.submit(NewRequest::new(pid, "x")).unwrap();
        let req = lc.get(id).unwrap().unwrap();
        assert_eq!(build_continuation(&lc, &req), "");
    }

    #[test]
    fn test_parent_context_is_bounded() {
        let (lc, pid) = setup();
        let parent = lc.submit(NewRequest::new(pid, "x")).unwrap();
        for i in 0..25 {
            lc.log(parent, LogLevel::Info, &format!("step {i}")).unwrap();
        }
        lc.claim_next().unwrap();
        lc.finalize(parent, RequestStatus::Error, &"r".repeat(5000)).unwrap();

        let child = lc.restart(parent, RestartOverrides::default()).unwrap().unwrap();
        let req = lc.get(child).unwrap().unwrap();
        let text = build_continuation(&lc, &req);

        assert!(text.contains(&format!("Previous request #{parent}:")));
        assert!(text.contains("Status: error"));
        let log_lines: Vec<&str> = text.lines().filter(|l| l.starts_with("  [")).collect();
        assert_eq!(log_lines.len(), 10);
        assert_eq!(log_lines[0], "  [info] step 15");
        assert_eq!(log_lines[9], "  [info] step 24");
        assert!(text.contains(&"r".repeat(1000)));
        assert!(!text.contains(&"r".repeat(1001)));
        assert!(text.ends_with("Avoid repeating completed work."));
    }

    #[test]
    fn test_missing_parent_is_empty() {
        let (lc, pid) = setup();
        let id = lc.submit(NewRequest::new(pid, "x")).unwrap();
        let mut req = lc.get(id).unwrap().unwrap();
        req.parent_id = Some(777);
        assert_eq!(build_continuation(&lc, &req), "");
    }
}
