//! Workspace Tool Manifests
//!
//! A sandbox can define its own tools in `*.tool.json` files at its root:
//!
//! ```json
//! {
//!   "tools": [
//!     {
//!       "name": "word_count",
//!       "description": "Counts words in a file",
//!       "parameters": {"type": "object", "properties": {"path": {"type": "string"}}},
//!       "script": "tools/word_count.py"
//!     }
//!   ]
//! }
//! ```
//!
//! Each tool runs its script with the configured interpreter and receives the
//! call arguments as one JSON-encoded command-line argument. Manifests are
//! read in file-name order, so a later file wins a name clash; the source as
//! a whole is normally registered after the built-ins so workspace tools
//! can replace them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use agent_core::error::{AgentError, Result};
use agent_core::sandbox::{Sandbox, SandboxLimits};
use agent_core::tool::{SANDBOX_ROOT_PARAM, Tool, ToolDeclaration, ToolSource};

use crate::{ToolsConfig, open_sandbox};

pub const MANIFEST_SUFFIX: &str = ".tool.json";

/// Stems that never load as manifests
const RESERVED_STEMS: &[&str] = &["security_utils"];

const SCRIPT_EXTENSION: &str = "py";

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    tools: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default = "empty_schema")]
    parameters: Value,
    script: Option<String>,
}

fn empty_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

/// Tool source reading `*.tool.json` manifests from one directory
pub struct ManifestSource {
    dir: PathBuf,
    interpreter: String,
    limits: SandboxLimits,
}

impl ManifestSource {
    pub fn new(dir: impl Into<PathBuf>, config: &ToolsConfig) -> Self {
        Self {
            dir: dir.into(),
            interpreter: config.python.clone(),
            limits: config.limits.clone(),
        }
    }

    fn is_manifest(file_name: &str) -> bool {
        let Some(stem) = file_name.strip_suffix(MANIFEST_SUFFIX) else {
            return false;
        };
        !(stem.is_empty()
            || file_name.starts_with('_')
            || file_name.starts_with('.')
            || RESERVED_STEMS.contains(&stem))
    }

    fn manifest_files(&self) -> Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
            .filter(|entry| Self::is_manifest(&entry.file_name().to_string_lossy()))
            .map(|entry| entry.path())
            .collect();
        files.sort();
        Ok(files)
    }

    fn read_manifest(path: &Path) -> Result<Manifest> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Entries whose script is missing, outside the sandbox, or not a
    /// `.py` file are left out.
    fn build_tool(&self, sandbox: &Sandbox, entry: ManifestEntry) -> Option<ScriptTool> {
        let Some(script) = entry.script else {
            tracing::warn!(tool = %entry.name, "Manifest entry has no script, ignoring");
            return None;
        };
        let usable = sandbox.resolve(&script).is_ok_and(|p| {
            p.is_file() && p.extension().is_some_and(|e| e == SCRIPT_EXTENSION)
        });
        if !usable {
            tracing::warn!(tool = %entry.name, %script, "Manifest script not usable, ignoring");
            return None;
        }

        Some(ScriptTool {
            declaration: ToolDeclaration::new(entry.name, entry.description, entry.parameters),
            script,
            interpreter: self.interpreter.clone(),
            limits: self.limits.clone(),
        })
    }
}

impl ToolSource for ManifestSource {
    fn name(&self) -> &str {
        "workspace-manifests"
    }

    fn load(&self) -> Result<Vec<Arc<dyn Tool>>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let sandbox = Sandbox::with_limits(&self.dir, self.limits.clone())?;

        let mut tools: Vec<Arc<dyn Tool>> = Vec::new();
        for path in self.manifest_files()? {
            let manifest = match Self::read_manifest(&path) {
                Ok(manifest) => manifest,
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "Skipping tool manifest");
                    continue;
                }
            };
            for entry in manifest.tools {
                if let Some(tool) = self.build_tool(&sandbox, entry) {
                    tracing::info!(tool = %tool.declaration.name, file = %path.display(), "Loaded workspace tool");
                    tools.push(Arc::new(tool));
                }
            }
        }
        Ok(tools)
    }
}

/// Tool backed by a script inside the sandbox
pub struct ScriptTool {
    declaration: ToolDeclaration,
    script: String,
    interpreter: String,
    limits: SandboxLimits,
}

#[async_trait]
impl Tool for ScriptTool {
    fn declaration(&self) -> ToolDeclaration {
        self.declaration.clone()
    }

    fn uses_sandbox_root(&self) -> bool {
        true
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<String> {
        let sandbox = open_sandbox(args, &self.limits)?;

        let mut payload = args.clone();
        payload.remove(SANDBOX_ROOT_PARAM);
        let encoded = serde_json::to_string(&payload)
            .map_err(|e| AgentError::ToolValidation(e.to_string()))?;

        tracing::debug!(tool = %self.declaration.name, script = %self.script, "Running workspace tool");
        let report = sandbox
            .run(&self.interpreter, &self.script, SCRIPT_EXTENSION, &[encoded])
            .await?;
        Ok(report.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::tool::ToolRegistry;

    fn write(dir: &Path, name: &str, body: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, body).unwrap();
    }

    fn manifest(entries: Value) -> String {
        json!({ "tools": entries }).to_string()
    }

    fn names(source: &ManifestSource) -> Vec<String> {
        source
            .load()
            .unwrap()
            .iter()
            .map(|t| t.declaration().name)
            .collect()
    }

    #[test]
    fn test_manifest_file_filter() {
        assert!(ManifestSource::is_manifest("mine.tool.json"));
        assert!(!ManifestSource::is_manifest("_private.tool.json"));
        assert!(!ManifestSource::is_manifest(".hidden.tool.json"));
        assert!(!ManifestSource::is_manifest("security_utils.tool.json"));
        assert!(!ManifestSource::is_manifest("notes.json"));
        assert!(!ManifestSource::is_manifest(".tool.json"));
    }

    #[test]
    fn test_load_skips_bad_files_and_entries() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "tools/count.py", "print('hi')");
        write(
            root,
            "a.tool.json",
            &manifest(json!([
                {"name": "count", "description": "Counts", "script": "tools/count.py"},
                {"name": "no_script", "description": "Nothing to run"},
                {"name": "gone", "script": "tools/gone.py"},
                {"name": "escape", "script": "../outside.py"}
            ])),
        );
        write(root, "b.tool.json", "{ not json");
        write(
            root,
            "_hidden.tool.json",
            &manifest(json!([{"name": "hidden", "script": "tools/count.py"}])),
        );

        let source = ManifestSource::new(root, &ToolsConfig::default());
        assert_eq!(names(&source), ["count"]);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let source = ManifestSource::new(dir.path().join("absent"), &ToolsConfig::default());
        assert!(source.load().unwrap().is_empty());
    }

    #[test]
    fn test_workspace_tool_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "my_read.py", "print('custom')");
        write(
            root,
            "override.tool.json",
            &manifest(json!([{
                "name": "get_file_content",
                "description": "Workspace reader",
                "script": "my_read.py"
            }])),
        );

        let config = ToolsConfig::default();
        let registry = ToolRegistry::with_sources(vec![
            Arc::new(crate::builtin_source(config.clone())) as Arc<dyn ToolSource>,
            Arc::new(ManifestSource::new(root, &config)),
        ]);

        let tool = registry.get("get_file_content").unwrap();
        assert_eq!(tool.declaration().description, "Workspace reader");
    }

    #[test]
    fn test_new_manifest_picked_up_on_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let registry = ToolRegistry::with_sources(vec![
            Arc::new(ManifestSource::new(root, &ToolsConfig::default())) as Arc<dyn ToolSource>
        ]);
        assert!(registry.get("late").is_none());

        write(root, "late.py", "print(1)");
        write(
            root,
            "late.tool.json",
            &manifest(json!([{"name": "late", "script": "late.py"}])),
        );
        registry.refresh();
        assert!(registry.get("late").is_some());
    }
}
