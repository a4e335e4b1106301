//! Python Tools
//!
//! Script execution and package installation. Both run with the sandbox
//! root as working directory under the configured wall-clock limit.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::process::Command;

use agent_core::error::{AgentError, Result};
use agent_core::sandbox::SandboxLimits;
use agent_core::tool::{Tool, ToolDeclaration, params};

use crate::{ToolsConfig, open_sandbox};

/// Runs a `.py` file from the sandbox
pub struct RunPythonFileTool {
    python: String,
    limits: SandboxLimits,
}

impl RunPythonFileTool {
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            python: config.python.clone(),
            limits: config.limits.clone(),
        }
    }
}

#[async_trait]
impl Tool for RunPythonFileTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            "run_python_file",
            "Executes a Python file located in the working directory and captures its output",
            json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "File path to the Python file to execute, relative to the working directory"
                    },
                    "args": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Optional list of arguments to pass to the Python script"
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
        let script_args = params::string_list(args, "args");

        tracing::info!(script = %file_path, args = ?script_args, "Running Python file");
        let report = sandbox
            .run(&self.python, file_path, "py", &script_args)
            .await?;
        tracing::debug!(exit_code = ?report.exit_code, "Python file finished");

        Ok(report.render())
    }
}

/// Installs a package with pip into the interpreter's environment
pub struct InstallPackageTool {
    python: String,
    limits: SandboxLimits,
}

impl InstallPackageTool {
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            python: config.python.clone(),
            limits: config.limits.clone(),
        }
    }

    /// Anything that could be read as a pip option or a second argument is refused
    fn check_name(name: &str) -> Result<&str> {
        let name = name.trim();
        if name.is_empty() || name.starts_with('-') || name.chars().any(char::is_whitespace) {
            return Err(AgentError::ToolValidation(format!(
                "Invalid package name: '{name}'"
            )));
        }
        Ok(name)
    }
}

#[async_trait]
impl Tool for InstallPackageTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            "install_package",
            "Installs a Python package using pip. Use this if a required library is missing.",
            json!({
                "type": "object",
                "properties": {
                    "package_name": {
                        "type": "string",
                        "description": "The name of the package to install (e.g., 'matplotlib')."
                    }
                },
                "required": ["package_name"]
            }),
        )
    }

    fn uses_sandbox_root(&self) -> bool {
        true
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<String> {
        let sandbox = open_sandbox(args, &self.limits)?;
        let package = Self::check_name(params::required_str(args, "package_name")?)?;

        tracing::info!(%package, "Installing package");
        let mut command = Command::new(&self.python);
        command.args(["-m", "pip", "install", package]);
        let report = sandbox.exec(command).await?;

        if report.success() {
            Ok(format!("Successfully installed '{package}'."))
        } else {
            Err(AgentError::ToolExecution(format!(
                "Error installing '{package}':\n{}",
                report.render()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::root_args;
    use std::time::Duration;

    fn config() -> ToolsConfig {
        ToolsConfig {
            limits: SandboxLimits {
                exec_timeout: Duration::from_secs(10),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_package_name_checks() {
        assert_eq!(InstallPackageTool::check_name(" requests ").unwrap(), "requests");
        assert!(InstallPackageTool::check_name("--index-url=http://evil").is_err());
        assert!(InstallPackageTool::check_name("numpy pandas").is_err());
        assert!(InstallPackageTool::check_name("").is_err());
    }

    #[tokio::test]
    async fn test_rejected_name_never_runs_pip() {
        let dir = tempfile::tempdir().unwrap();
        let err = InstallPackageTool::new(&config())
            .execute(&root_args(dir.path(), json!({"package_name": "-r reqs.txt"})))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolValidation(_)));
    }

    #[tokio::test]
    async fn test_non_python_file_refused() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("run.sh"), "echo hi").unwrap();
        let err = RunPythonFileTool::new(&config())
            .execute(&root_args(dir.path(), json!({"file_path": "run.sh"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("expected .py"));
    }

    #[tokio::test]
    async fn test_script_outside_root_denied() {
        let dir = tempfile::tempdir().unwrap();
        let err = RunPythonFileTool::new(&config())
            .execute(&root_args(dir.path(), json!({"file_path": "../evil.py"})))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Denied(_)));
    }
}
