//! read_file：读取检出目录中的文件

use crate::tools::{Sandbox, ToolError};

pub fn read_file(sandbox: &Sandbox, path: &str) -> Result<String, ToolError> {
    let full = sandbox.resolve(path)?;
    if !full.is_file() {
        return Err(ToolError::NotFound(path.to_string()));
    }
    let content = std::fs::read_to_string(&full).map_err(|e| ToolError::io("read_file", e))?;
    Ok(format!("Contents of {}:\n{}", path, content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_existing_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("utils.py"), "def foo():\n    pass\n").unwrap();
        let sb = Sandbox::new(dir.path()).unwrap();

        let out = read_file(&sb, "utils.py").unwrap();
        assert_eq!(out, "Contents of utils.py:\ndef foo():\n    pass\n");

        let err = read_file(&sb, "nope.py").unwrap_err();
        assert_eq!(err.render(), "Error: File not found: nope.py");
    }

    #[test]
    fn test_directory_is_not_a_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        let sb = Sandbox::new(dir.path()).unwrap();
        assert_eq!(read_file(&sb, "src"), Err(ToolError::NotFound("src".into())));
    }
}
