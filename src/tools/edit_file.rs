//! edit_file：精确字符串替换
//!
//! old_string 必须在文件中恰好出现一次；零次与多次分别报错，绝不默默替换第一处。

use crate::tools::{Sandbox, ToolError};

pub fn edit_file(
    sandbox: &Sandbox,
    path: &str,
    old_string: &str,
    new_string: &str,
) -> Result<String, ToolError> {
    let full = sandbox.resolve(path)?;
    if !full.is_file() {
        return Err(ToolError::NotFound(path.to_string()));
    }
    if old_string.is_empty() {
        return Err(ToolError::InvalidInput {
            tool: "edit_file".into(),
            reason: "old_string must not be empty".into(),
        });
    }
    let content = std::fs::read_to_string(&full).map_err(|e| ToolError::io("edit_file", e))?;

    match content.matches(old_string).count() {
        0 => return Err(ToolError::StringNotFound(path.to_string())),
        1 => {}
        n => return Err(ToolError::AmbiguousMatch(n)),
    }

    let updated = content.replacen(old_string, new_string, 1);
    std::fs::write(&full, updated).map_err(|e| ToolError::io("edit_file", e))?;
    Ok(format!("Successfully edited {}", path))
}
