//! write_file：整体覆盖写入，按需创建父目录

use crate::tools::{Sandbox, ToolError};

/// 返回信息中的长度按 Unicode 字符计，不是字节数
pub fn write_file(sandbox: &Sandbox, path: &str, content: &str) -> Result<String, ToolError> {
    let full = sandbox.resolve(path)?;
    if full.is_dir() {
        return Err(ToolError::io("write_file", format!("{} is a directory", path)));
    }
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ToolError::io("write_file", e))?;
    }
    std::fs::write(&full, content).map_err(|e| ToolError::io("write_file", e))?;
    Ok(format!(
        "Successfully wrote {} characters to {}",
        content.chars().count(),
        path
    ))
}
