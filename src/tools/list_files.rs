//! list_files：以检出根目录为基准的 glob 匹配，返回相对路径

use glob::{glob_with, MatchOptions, Pattern};

use crate::tools::{Sandbox, ToolError};

pub fn list_files(sandbox: &Sandbox, pattern: &str) -> Result<String, ToolError> {
    let pattern = pattern.trim();
    if pattern.starts_with('/') || pattern.split(['/', '\\']).any(|part| part == "..") {
        return Err(ToolError::PathEscape(pattern.to_string()));
    }

    let root = Pattern::escape(&sandbox.root().to_string_lossy());
    let full_pattern = format!("{}/{}", root.trim_end_matches('/'), pattern);
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        // 与 shell 一致：通配符不匹配隐藏文件（.git 等）
        require_literal_leading_dot: true,
    };
    let entries = glob_with(&full_pattern, options).map_err(|e| ToolError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.msg.to_string(),
    })?;

    let mut files: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|p| p.starts_with(sandbox.root()))
        .map(|p| sandbox.relative(&p))
        // 经目录符号链接到达根目录之外的条目不列出
        .filter(|rel| !rel.is_empty() && sandbox.resolve(rel).is_ok())
        .collect();
    files.sort();

    if files.is_empty() {
        Ok(format!("No files found matching '{}'", pattern))
    } else {
        Ok(format!("Files matching '{}':\n{}", pattern, files.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> (tempfile::TempDir, Sandbox) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("templates/partials")).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join("app.py"), "").unwrap();
        std::fs::write(root.join("utils.py"), "").unwrap();
        std::fs::write(root.join("templates/index.html"), "").unwrap();
        std::fs::write(root.join("templates/partials/nav.html"), "").unwrap();
        std::fs::write(root.join(".git/config"), "").unwrap();
        let sb = Sandbox::new(root).unwrap();
        (dir, sb)
    }

    #[test]
    fn test_top_level_glob() {
        let (_dir, sb) = tree();
        assert_eq!(
            list_files(&sb, "*.py").unwrap(),
            "Files matching '*.py':\napp.py\nutils.py"
        );
    }

    #[test]
    fn test_recursive_glob_skips_hidden() {
        let (_dir, sb) = tree();
        let out = list_files(&sb, "**/*.html").unwrap();
        assert!(out.contains("templates/index.html"));
        assert!(out.contains("templates/partials/nav.html"));
        assert!(!list_files(&sb, "*").unwrap().contains(".git"));
    }

    #[test]
    fn test_no_match_and_escape() {
        let (_dir, sb) = tree();
        assert_eq!(list_files(&sb, "*.rs").unwrap(), "No files found matching '*.rs'");
        assert!(matches!(list_files(&sb, "../*"), Err(ToolError::PathEscape(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_dir_outside_root_is_hidden() {
        let (dir, sb) = tree();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "s").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let all = list_files(&sb, "**/*").unwrap();
        assert!(all.contains("app.py"));
        assert!(!all.contains("secret.txt"));
        assert_eq!(list_files(&sb, "link/*").unwrap(), "No files found matching 'link/*'");
    }
}
