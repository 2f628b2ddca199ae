//! 检出目录沙箱
//!
//! Sandbox 绑定检出根目录（规范化后），resolve 把模型给出的相对路径解析为绝对路径：
//! 先做词法归一（消掉 `.` / `..`），再规范化最近的已存在祖先（解析符号链接），
//! 结果必须仍在根目录下。待创建的文件也能解析。

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use crate::tools::ToolError;

#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    /// 根目录必须存在
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self {
            root: root.as_ref().canonicalize()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, path: &str) -> Result<PathBuf, ToolError> {
        let trimmed = path.trim();
        let escape = || ToolError::PathEscape(trimmed.to_string());

        let mut normalized = PathBuf::new();
        for component in self.root.join(trimmed).components() {
            match component {
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(escape());
                    }
                }
                Component::CurDir => {}
                other => normalized.push(other),
            }
        }
        if !normalized.starts_with(&self.root) {
            return Err(escape()); // 如 ../../etc/passwd 或 /etc/passwd
        }

        // 规范化最近的已存在祖先，剩余部分原样拼回
        let mut existing = normalized.as_path();
        let mut tail: Vec<OsString> = Vec::new();
        let resolved = loop {
            match existing.canonicalize() {
                Ok(canonical) => {
                    let mut full = canonical;
                    for part in tail.iter().rev() {
                        full.push(part);
                    }
                    break full;
                }
                Err(_) => match (existing.parent(), existing.file_name()) {
                    (Some(parent), Some(name)) => {
                        tail.push(name.to_os_string());
                        existing = parent;
                    }
                    _ => return Err(escape()),
                },
            }
        };

        if resolved.starts_with(&self.root) {
            Ok(resolved)
        } else {
            Err(escape()) // 符号链接指向根目录之外
        }
    }

    /// 绝对路径转为相对根目录的显示路径（`/` 分隔）
    pub fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_existing_and_new_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.py"), "x").unwrap();
        let sb = Sandbox::new(dir.path()).unwrap();

        let existing = sb.resolve("./app.py").unwrap();
        assert_eq!(existing, sb.root().join("app.py"));

        let fresh = sb.resolve("templates/new/index.html").unwrap();
        assert_eq!(sb.relative(&fresh), "templates/new/index.html");

        let inner = sb.resolve("templates/../app.py").unwrap();
        assert_eq!(inner, existing);
    }

    #[test]
    fn test_rejects_escapes() {
        let dir = tempfile::tempdir().unwrap();
        let sb = Sandbox::new(dir.path()).unwrap();
        assert!(matches!(sb.resolve("../outside.txt"), Err(ToolError::PathEscape(_))));
        assert!(matches!(sb.resolve("a/../../x"), Err(ToolError::PathEscape(_))));
        assert!(matches!(sb.resolve("/etc/passwd"), Err(ToolError::PathEscape(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_rejects_symlink_escape() {
        let outside = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        let sb = Sandbox::new(dir.path()).unwrap();
        assert!(matches!(sb.resolve("link/secret.txt"), Err(ToolError::PathEscape(_))));
    }

    #[test]
    fn test_missing_root_fails() {
        assert!(Sandbox::new("/definitely/not/here/incept").is_err());
    }
}
