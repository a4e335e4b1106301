//! File Tools
//!
//! Read, list and write files inside the sandbox.

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use agent_core::error::{AgentError, Result};
use agent_core::sandbox::{SandboxError, SandboxLimits};
use agent_core::tool::{Tool, ToolDeclaration, params};

use crate::open_sandbox;

/// Reads a text file, capped at the configured number of characters
pub struct GetFileContentTool {
    limits: SandboxLimits,
}

impl GetFileContentTool {
    pub const fn new(limits: SandboxLimits) -> Self {
        Self { limits }
    }
}

#[async_trait]
impl Tool for GetFileContentTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            "get_file_content",
            "Retrieves the content of a specified file relative to the working directory",
            json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "File path to read content from, relative to the working directory"
                    }
                },
                "required": ["file_path"]
            }),
        )
    }

    fn uses_sandbox_root(&self) -> bool {
        true
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<String> {
        let sandbox = open_sandbox(args, &self.limits)?;
        let file_path = params::required_str(args, "file_path")?;
        Ok(sandbox.read_text(file_path)?)
    }
}

/// Lists a directory with sizes
#[derive(Default)]
pub struct GetFilesInfoTool;

impl GetFilesInfoTool {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for GetFilesInfoTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            "get_files_info",
            "Lists files in the specified directory along with their sizes, constrained to the working directory.",
            json!({
                "type": "object",
                "properties": {
                    "directory": {
                        "type": "string",
                        "description": "The directory to list files from, relative to the working directory. If not provided, lists files in the working directory itself."
                    }
                }
            }),
        )
    }

    fn uses_sandbox_root(&self) -> bool {
        true
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<String> {
        let sandbox = open_sandbox(args, &SandboxLimits::default())?;
        let directory = params::optional_str(args, "directory").unwrap_or(".");
        let path = sandbox.resolve(directory)?;

        if !path.is_dir() {
            return Err(SandboxError::NotADirectory(directory.to_string()).into());
        }

        let mut entries = Vec::new();
        let mut reader = tokio::fs::read_dir(&path).await?;
        while let Some(entry) = reader.next_entry().await? {
            let metadata = entry.metadata().await?;
            entries.push((
                entry.file_name().to_string_lossy().into_owned(),
                metadata.len(),
                metadata.is_dir(),
            ));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        if entries.is_empty() {
            return Ok(format!("Directory \"{directory}\" is empty"));
        }

        Ok(entries
            .into_iter()
            .map(|(name, size, is_dir)| format!("- {name}: file_size={size} bytes, is_dir={is_dir}"))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// Creates or overwrites a file
#[derive(Default)]
pub struct WriteFileTool;

impl WriteFileTool {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            "write_file",
            "Writes content to a file within the working directory. Creates the file and any missing parent directories, and overwrites existing content.",
            json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "Path of the file to write, relative to the working directory"
                    },
                    "content": {
                        "type": "string",
                        "description": "Content to write to the file"
                    }
                },
                "required": ["file_path", "content"]
            }),
        )
    }

    fn uses_sandbox_root(&self) -> bool {
        true
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<String> {
        let sandbox = open_sandbox(args, &SandboxLimits::default())?;
        let file_path = params::required_str(args, "file_path")?;
        let content = params::required_str(args, "content")?;
        let path = sandbox.resolve(file_path)?;

        if path.is_dir() {
            return Err(AgentError::ToolExecution(format!(
                "\"{file_path}\" is a directory"
            )));
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;

        tracing::info!(path = %file_path, bytes = content.len(), "Wrote file");
        Ok(format!(
            "Successfully wrote to \"{file_path}\" ({} characters written)",
            content.chars().count()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::root_args;

    #[tokio::test]
    async fn test_read_truncates_with_marker() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.txt"), "x".repeat(25)).unwrap();

        let tool = GetFileContentTool::new(SandboxLimits {
            max_chars: 10,
            ..Default::default()
        });
        let out = tool
            .execute(&root_args(dir.path(), json!({"file_path": "big.txt"})))
            .await
            .unwrap();
        assert_eq!(
            out,
            format!("{}\n[...File \"big.txt\" truncated at 10 characters]", "x".repeat(10))
        );
    }

    #[tokio::test]
    async fn test_read_outside_root_denied() {
        let dir = tempfile::tempdir().unwrap();
        let err = GetFileContentTool::new(SandboxLimits::default())
            .execute(&root_args(dir.path(), json!({"file_path": "/etc/passwd"})))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Denied(_)));
    }

    #[tokio::test]
    async fn test_list_is_sorted_with_sizes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.py"), "12345").unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("pkg")).unwrap();

        let out = GetFilesInfoTool::new()
            .execute(&root_args(dir.path(), json!({})))
            .await
            .unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "- a.txt: file_size=0 bytes, is_dir=false");
        assert_eq!(lines[1], "- b.py: file_size=5 bytes, is_dir=false");
        assert!(lines[2].starts_with("- pkg: file_size="));
        assert!(lines[2].ends_with("is_dir=true"));
    }

    #[tokio::test]
    async fn test_list_rejects_files_and_escapes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        let tool = GetFilesInfoTool::new();

        let err = tool
            .execute(&root_args(dir.path(), json!({"directory": "a.txt"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("is not a directory"));

        let err = tool
            .execute(&root_args(dir.path(), json!({"directory": "../"})))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Denied(_)));
    }

    #[tokio::test]
    async fn test_write_creates_parents_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteFileTool::new();

        tool.execute(&root_args(dir.path(), json!({"file_path": "pkg/mod.py", "content": "old"})))
            .await
            .unwrap();
        let out = tool
            .execute(&root_args(dir.path(), json!({"file_path": "pkg/mod.py", "content": "żółw"})))
            .await
            .unwrap();

        assert!(out.contains("4 characters written"));
        assert_eq!(std::fs::read_to_string(dir.path().join("pkg/mod.py")).unwrap(), "żółw");
    }
}
