//! Tool System
//!
//! Tools are collected from an ordered list of [`ToolSource`]s into a
//! catalog keyed by name. A later source replaces an earlier tool of the same
//! name, which is how a workspace-local tool overrides a built-in one.
//!
//! The catalog is an immutable snapshot swapped wholesale on refresh, so a
//! declaration can never point at a stale handler.

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::error::{AgentError, Result};
use crate::message::{FunctionCall, Part, ToolOutcome};

/// Argument the dispatcher fills with the sandbox root
pub const SANDBOX_ROOT_PARAM: &str = "working_directory";

/// Tool definition schema (for backend function calling)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to the backend)
    pub description: String,

    /// JSON schema of the arguments object
    pub parameters: Value,
}

impl ToolDeclaration {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Copy with the reserved sandbox-root argument removed from the schema
    fn without_reserved(&self) -> Self {
        let mut decl = self.clone();
        if let Some(props) = decl
            .parameters
            .get_mut("properties")
            .and_then(Value::as_object_mut)
        {
            props.remove(SANDBOX_ROOT_PARAM);
        }
        if let Some(required) = decl
            .parameters
            .get_mut("required")
            .and_then(Value::as_array_mut)
        {
            required.retain(|v| v.as_str() != Some(SANDBOX_ROOT_PARAM));
        }
        decl
    }
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Declaration sent to the backend
    fn declaration(&self) -> ToolDeclaration;

    /// Whether the dispatcher must inject [`SANDBOX_ROOT_PARAM`]
    fn uses_sandbox_root(&self) -> bool {
        false
    }

    /// Execute the tool with the given arguments
    async fn execute(&self, args: &Map<String, Value>) -> Result<String>;

    /// Validate arguments before execution (optional)
    fn validate(&self, args: &Map<String, Value>) -> Result<()> {
        let decl = self.declaration();
        let required = decl
            .parameters
            .get("required")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str);

        for param in required {
            if !args.contains_key(param) {
                return Err(AgentError::ToolValidation(format!(
                    "Missing required parameter: {param}"
                )));
            }
        }

        Ok(())
    }
}

/// A unit that contributes tools to the registry
pub trait ToolSource: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Produce this source's tools. A failure skips the source, never the refresh.
    fn load(&self) -> Result<Vec<Arc<dyn Tool>>>;
}

/// Source backed by a registration function
pub struct FnSource<F> {
    name: String,
    register: F,
}

impl<F> FnSource<F>
where
    F: Fn() -> Vec<Arc<dyn Tool>> + Send + Sync,
{
    pub fn new(name: impl Into<String>, register: F) -> Self {
        Self {
            name: name.into(),
            register,
        }
    }
}

impl<F> ToolSource for FnSource<F>
where
    F: Fn() -> Vec<Arc<dyn Tool>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Vec<Arc<dyn Tool>>> {
        Ok((self.register)())
    }
}

/// Immutable name → tool mapping, in first-registration order
#[derive(Clone, Default)]
pub struct Catalog {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Insert or replace by name
    pub fn insert(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.declaration().name;
        if let Some(&slot) = self.index.get(&name) {
            tracing::debug!(tool = %name, "Replacing earlier tool definition");
            self.tools[slot] = tool;
        } else {
            self.index.insert(name, self.tools.len());
            self.tools.push(tool);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&i| Arc::clone(&self.tools[i]))
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.declaration().name).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Registry for available tools
pub struct ToolRegistry {
    sources: Vec<Arc<dyn ToolSource>>,
    catalog: RwLock<Arc<Catalog>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            catalog: RwLock::new(Arc::new(Catalog::default())),
        }
    }

    /// Registry over `sources`, already refreshed
    pub fn with_sources(sources: Vec<Arc<dyn ToolSource>>) -> Self {
        let registry = Self {
            sources,
            catalog: RwLock::new(Arc::new(Catalog::default())),
        };
        registry.refresh();
        registry
    }

    /// Append a source; it takes precedence over every earlier one from the
    /// next refresh on.
    pub fn add_source(&mut self, source: Arc<dyn ToolSource>) {
        self.sources.push(source);
    }

    /// Register a single tool as its own source, above every existing source
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.declaration().name;
        self.sources
            .push(Arc::new(FnSource::new(name, move || vec![Arc::clone(&tool)])));
        self.refresh();
    }

    /// Rebuild the catalog from scratch, scanning sources in order.
    pub fn refresh(&self) -> Arc<Catalog> {
        let mut next = Catalog::default();
        for source in &self.sources {
            match source.load() {
                Ok(tools) => {
                    tracing::debug!(source = source.name(), count = tools.len(), "Loaded tool source");
                    for tool in tools {
                        next.insert(tool);
                    }
                }
                Err(e) => {
                    tracing::warn!(source = source.name(), error = %e, "Skipping tool source");
                }
            }
        }
        let next = Arc::new(next);
        self.swap(Arc::clone(&next));
        next
    }

    /// Current catalog snapshot
    pub fn snapshot(&self) -> Arc<Catalog> {
        self.catalog
            .read()
            .map_or_else(|p| Arc::clone(&p.into_inner()), |c| Arc::clone(&c))
    }

    fn swap(&self, next: Arc<Catalog>) {
        match self.catalog.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.snapshot().get(name)
    }

    /// Declarations for the backend, reserved argument stripped
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.snapshot()
            .tools
            .iter()
            .map(|t| t.declaration().without_reserved())
            .collect()
    }

    /// Get tool names
    pub fn names(&self) -> Vec<String> {
        self.snapshot().names()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Execute a call and fold every failure into the returned outcome.
    ///
    /// An unknown name triggers one refresh before giving up. Tools that use
    /// the sandbox root always receive `sandbox_root`, whatever the backend sent.
    pub async fn dispatch(&self, call: &FunctionCall, sandbox_root: &Path) -> ToolOutcome {
        tracing::debug!(tool = %call.name, "Dispatching tool call");

        let tool = match self.get(&call.name) {
            Some(tool) => tool,
            None => match self.refresh().get(&call.name) {
                Some(tool) => tool,
                None => {
                    tracing::warn!(tool = %call.name, "Unknown function requested");
                    return ToolOutcome::Error(
                        AgentError::ToolNotFound(call.name.clone()).to_string(),
                    );
                }
            },
        };

        let mut args = call.args.clone();
        if tool.uses_sandbox_root() {
            args.insert(
                SANDBOX_ROOT_PARAM.to_string(),
                Value::String(sandbox_root.display().to_string()),
            );
        }

        let result = match tool.validate(&args) {
            Ok(()) => AssertUnwindSafe(tool.execute(&args))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    tracing::error!(tool = %call.name, "Tool panicked");
                    Err(AgentError::ToolExecution(panic_message(panic.as_ref())))
                }),
            Err(e) => Err(e),
        };

        match result {
            Ok(output) => ToolOutcome::Result(output),
            Err(e) => {
                tracing::debug!(tool = %call.name, error = %e, "Tool call failed");
                ToolOutcome::Error(failure_message(&e))
            }
        }
    }

    /// Dispatch and wrap as a function-response part
    pub async fn dispatch_part(&self, call: &FunctionCall, sandbox_root: &Path) -> Part {
        let outcome = self.dispatch(call, sandbox_root).await;
        Part::FunctionResponse(crate::message::FunctionResponse {
            name: call.name.clone(),
            response: outcome,
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .map_or_else(|| "tool panicked".into(), |msg| format!("tool panicked: {msg}"))
}

fn failure_message(err: &AgentError) -> String {
    match err {
        AgentError::Denied(_) | AgentError::Timeout(_) | AgentError::ToolValidation(_) => {
            format!("Error: {err}")
        }
        _ => format!("Function execution failed: {err}"),
    }
}

/// Argument accessors shared by tool bodies
pub mod params {
    use serde_json::{Map, Value};
    use std::path::PathBuf;

    use crate::error::{AgentError, Result};

    use super::SANDBOX_ROOT_PARAM;

    /// Required string argument
    pub fn required_str<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
        args.get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| AgentError::ToolValidation(format!("Missing or non-string argument: {key}")))
    }

    /// Optional string argument
    pub fn optional_str<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
        args.get(key).and_then(Value::as_str)
    }

    /// Integer argument, accepting numeric strings
    pub fn optional_i64(args: &Map<String, Value>, key: &str) -> Option<i64> {
        match args.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Array of strings (non-strings are stringified)
    pub fn string_list(args: &Map<String, Value>, key: &str) -> Vec<String> {
        args.get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Sandbox root injected by the dispatcher
    pub fn sandbox_root(args: &Map<String, Value>) -> Result<PathBuf> {
        optional_str(args, SANDBOX_ROOT_PARAM)
            .map(PathBuf::from)
            .ok_or_else(|| AgentError::Config("sandbox root was not injected".into()))
    }
}
