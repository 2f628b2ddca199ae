//! 提示词
//!
//! 系统提示词在每个请求开始时读取 `<data_dir>/prompts/incept_system.txt`（可热更新），
//! 文件不存在或为空时使用内置版本。

use std::path::Path;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert full-stack developer with the ability to read and modify files.
You are working on web application projects managed by the Inception system.

IMPORTANT: You have tools to ACTUALLY make changes to files. Use them!
1. First, use read_file to examine relevant files
2. Use edit_file for small targeted changes (preferred) or write_file for new files
3. Use list_files to explore the project structure
4. Use log_progress to communicate what you're doing
5. Make all necessary changes to fully implement the request

Common project structures:
- Flask/Python: app.py, templates/, static/, requirements.txt
- Node/Express: server.js, package.json, public/, views/
- React: src/, public/, package.json
- Next.js: pages/, components/, package.json

Always read a file before editing it to understand its current state.
Be thorough and implement changes completely.";

pub fn load_system_prompt(path: Option<&Path>) -> String {
    let Some(path) = path else {
        return DEFAULT_SYSTEM_PROMPT.to_string();
    };
    match std::fs::read_to_string(path) {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => DEFAULT_SYSTEM_PROMPT.to_string(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => DEFAULT_SYSTEM_PROMPT.to_string(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Cannot read system prompt, using built-in");
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
    }
}

/// 首条用户消息
pub fn build_user_message(project_name: &str, request_text: &str, continuation: &str) -> String {
    format!(
        "Please implement the following request for the project \"{project_name}\":\n\n{request_text}\n{continuation}\n\nStart by reading relevant files to understand the current code, then make the necessary changes."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_file_overrides_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("incept_system.txt");
        assert_eq!(load_system_prompt(Some(&path)), DEFAULT_SYSTEM_PROMPT);

        std::fs::write(&path, "Custom prompt v1").unwrap();
        assert_eq!(load_system_prompt(Some(&path)), "Custom prompt v1");
        std::fs::write(&path, "Custom prompt v2").unwrap();
        assert_eq!(load_system_prompt(Some(&path)), "Custom prompt v2");

        std::fs::write(&path, "  \n").unwrap();
        assert_eq!(load_system_prompt(Some(&path)), DEFAULT_SYSTEM_PROMPT);
        assert_eq!(load_system_prompt(None), DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn test_user_message_layout() {
        let msg = build_user_message("shop", "add a footer", "");
        assert!(msg.starts_with("Please implement the following request for the project \"shop\":\n\nadd a footer\n"));
        assert!(msg.ends_with("then make the necessary changes."));
    }
}
