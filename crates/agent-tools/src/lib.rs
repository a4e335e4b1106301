//! # agent-tools
//!
//! Built-in tools for the sandbox agent, plus the workspace manifest source
//! that lets a sandbox define its own script-backed tools.
//!
//! Every tool here works on paths relative to the sandbox root, which the
//! registry injects into each call.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_tools::{ManifestSource, ToolsConfig, builtin_source};
//!
//! let config = ToolsConfig::default();
//! let registry = ToolRegistry::with_sources(vec![
//!     Arc::new(builtin_source(config.clone())),
//!     Arc::new(ManifestSource::new(&root, &config)),
//! ]);
//! ```

use std::sync::Arc;

use agent_core::error::Result;
use agent_core::sandbox::{Sandbox, SandboxLimits};
use agent_core::tool::{FnSource, Tool, ToolSource, params};
use serde_json::{Map, Value};

pub mod files;
pub mod manifest;
pub mod python;
pub mod search;
pub mod tasks;

pub use manifest::ManifestSource;

/// Settings shared by the built-in tools
#[derive(Clone, Debug)]
pub struct ToolsConfig {
    /// Read cap and execution timeout
    pub limits: SandboxLimits,

    /// Interpreter used for `.py` scripts and pip
    pub python: String,

    /// Brave Search subscription token
    pub brave_api_key: Option<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            limits: SandboxLimits::default(),
            python: "python3".into(),
            brave_api_key: None,
        }
    }
}

/// Instantiate every built-in tool
pub fn builtin_tools(config: &ToolsConfig) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(files::GetFileContentTool::new(config.limits.clone())),
        Arc::new(files::GetFilesInfoTool::new()),
        Arc::new(files::WriteFileTool::new()),
        Arc::new(python::RunPythonFileTool::new(config)),
        Arc::new(python::InstallPackageTool::new(config)),
        Arc::new(search::SearchWebTool::new(config.brave_api_key.clone())),
        Arc::new(tasks::AddTaskTool),
        Arc::new(tasks::ListTasksTool),
        Arc::new(tasks::FinishTaskTool),
        Arc::new(tasks::ClearTasksTool),
    ]
}

/// The built-ins as a registry source
pub fn builtin_source(config: ToolsConfig) -> impl ToolSource {
    FnSource::new("builtin", move || builtin_tools(&config))
}

/// Open the sandbox named by the injected root argument
pub(crate) fn open_sandbox(args: &Map<String, Value>, limits: &SandboxLimits) -> Result<Sandbox> {
    let root = params::sandbox_root(args)?;
    Ok(Sandbox::with_limits(&root, limits.clone())?)
}

/// Arguments as the dispatcher would hand them over
#[cfg(test)]
pub(crate) fn root_args(root: &std::path::Path, args: Value) -> Map<String, Value> {
    let mut map = args.as_object().cloned().unwrap_or_default();
    map.insert(
        agent_core::tool::SANDBOX_ROOT_PARAM.to_string(),
        Value::String(root.display().to_string()),
    );
    map
}
