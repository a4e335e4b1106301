//! Task List Tools
//!
//! A small plan the agent keeps for multi-step goals, stored as
//! `tasks.json` in the sandbox root.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use agent_core::error::{AgentError, Result};
use agent_core::sandbox::{Sandbox, SandboxLimits};
use agent_core::tool::{Tool, ToolDeclaration, params};

use crate::open_sandbox;

pub const TASKS_FILE: &str = "tasks.json";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Done,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub description: String,
    pub status: TaskStatus,
}

/// `tasks.json` under a sandbox root
pub struct TaskList {
    path: PathBuf,
}

impl TaskList {
    /// The task file goes through the sandbox like any tool path.
    pub fn open(sandbox: &Sandbox) -> Result<Self> {
        Ok(Self {
            path: sandbox.resolve(TASKS_FILE)?,
        })
    }

    fn from_args(args: &Map<String, Value>) -> Result<Self> {
        Self::open(&open_sandbox(args, &SandboxLimits::default())?)
    }

    /// Missing or unreadable file reads as an empty list
    pub async fn load(&self) -> Vec<Task> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Cannot read task list");
                return Vec::new();
            }
        };
        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), error = %e, "Corrupt task list, starting empty");
            Vec::new()
        })
    }

    pub async fn save(&self, tasks: &[Task]) -> Result<()> {
        let json = serde_json::to_vec_pretty(tasks)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

fn schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

pub struct AddTaskTool;

#[async_trait]
impl Tool for AddTaskTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            "add_task",
            "Adds a new task to the internal plan. Use this at the start of complex goals.",
            schema(
                json!({"description": {"type": "string", "description": "Description of the task to be done."}}),
                &["description"],
            ),
        )
    }

    fn uses_sandbox_root(&self) -> bool {
        true
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<String> {
        let list = TaskList::from_args(args)?;
        let description = params::required_str(args, "description")?;

        let mut tasks = list.load().await;
        let id = tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1;
        tasks.push(Task {
            id,
            description: description.to_string(),
            status: TaskStatus::Pending,
        });
        list.save(&tasks).await?;

        Ok(format!("Task added: [ID: {id}] {description}"))
    }
}

pub struct ListTasksTool;

#[async_trait]
impl Tool for ListTasksTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            "list_tasks",
            "Shows the current status of all tasks.",
            schema(json!({}), &[]),
        )
    }

    fn uses_sandbox_root(&self) -> bool {
        true
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<String> {
        let tasks = TaskList::from_args(args)?.load().await;
        if tasks.is_empty() {
            return Ok("Task list is empty.".into());
        }

        let mut out = String::from("Current Plan:");
        for task in &tasks {
            let (mark, status) = match task.status {
                TaskStatus::Done => ("[x]", "done"),
                TaskStatus::Pending => ("[ ]", "pending"),
            };
            out.push_str(&format!("\n{mark} {}. {} ({status})", task.id, task.description));
        }
        Ok(out)
    }
}

pub struct FinishTaskTool;

#[async_trait]
impl Tool for FinishTaskTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            "finish_task",
            "Marks a specific task as completed.",
            schema(
                json!({"task_id": {"type": "integer", "description": "The ID of the task to complete."}}),
                &["task_id"],
            ),
        )
    }

    fn uses_sandbox_root(&self) -> bool {
        true
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<String> {
        let list = TaskList::from_args(args)?;
        let task_id = params::optional_i64(args, "task_id")
            .ok_or_else(|| AgentError::ToolValidation("task_id must be an integer".into()))?;

        let mut tasks = list.load().await;
        let Some(task) = tasks
            .iter_mut()
            .find(|t| i64::try_from(t.id).is_ok_and(|id| id == task_id))
        else {
            return Err(AgentError::ToolExecution(format!(
                "Task ID {task_id} not found."
            )));
        };
        task.status = TaskStatus::Done;
        list.save(&tasks).await?;

        Ok(format!("Task {task_id} marked as done."))
    }
}

pub struct ClearTasksTool;

#[async_trait]
impl Tool for ClearTasksTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            "clear_tasks",
            "Deletes all tasks from the plan. Use before starting a completely new project.",
            schema(json!({}), &[]),
        )
    }

    fn uses_sandbox_root(&self) -> bool {
        true
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<String> {
        TaskList::from_args(args)?.save(&[]).await?;
        Ok("Task list cleared.".into())
    }
}
