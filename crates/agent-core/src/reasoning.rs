//! Orchestration Loop
//!
//! Iterative tool-calling loop:
//!
//! ```text
//! AWAITING_BACKEND ──no calls──▶ DONE
//!        │  ▲
//!   calls│  │tool turn appended + saved
//!        ▼  │
//!  EXECUTING_CALLS
//! ```
//!
//! The budget bounds the number of backend round trips per invocation.
//! A reply without usage metadata aborts the invocation.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::message::{Conversation, FunctionResponse, Part, ToolOutcome, Turn};
use crate::provider::{GenerateRequest, GenerationOptions, LlmProvider};
use crate::security::{GateDecision, SecurityGate};
use crate::session::ConversationStore;
use crate::tool::ToolRegistry;

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// System instruction sent with every request
    pub system_prompt: String,

    /// Maximum backend round trips per invocation
    pub max_iterations: usize,

    /// Generation options
    pub generation: GenerationOptions,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            max_iterations: 20,
            generation: GenerationOptions::default(),
        }
    }
}

pub const DEFAULT_SYSTEM_PROMPT: &str = r"You are a helpful AI coding agent working inside a sandboxed directory.

When a user asks a question or makes a request, make a function call plan. You can:
- List files and directories
- Read file contents
- Write or overwrite files
- Execute Python files with optional arguments
- Install Python packages
- Search the web for current information
- Keep a task list for multi-step goals

All paths you provide must be relative to the working directory. You do not need to specify the working directory in your function calls as it is automatically injected for security reasons.

Python files you write are reviewed for safety before they are saved, and writes and executions need the operator's approval. If a call is refused, read the reason and adjust your plan instead of repeating it.

When you have everything you need, answer directly without calling any function.";

/// How an invocation ended without a fatal error
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// The backend produced a turn without calls
    Completed { text: String, iterations: usize },

    /// The budget ran out before a final turn
    BudgetExceeded { iterations: usize },
}

impl RunOutcome {
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// The main Agent struct
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    gate: Arc<SecurityGate>,
    store: Arc<dyn ConversationStore>,
    sandbox_root: PathBuf,
    config: AgentConfig,
}

impl Agent {
    /// Create a new agent
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        gate: Arc<SecurityGate>,
        store: Arc<dyn ConversationStore>,
        sandbox_root: impl Into<PathBuf>,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            gate,
            store,
            sandbox_root: sandbox_root.into(),
            config,
        }
    }

    /// Run one top-level invocation starting from `input`.
    ///
    /// History comes from the store; the store is only written after a
    /// successful step (tool turn appended, or final answer received).
    pub async fn run(&self, input: Turn) -> Result<RunOutcome> {
        let mut conversation = self.store.load()?;
        tracing::debug!(previous_turns = conversation.len(), "Loaded conversation");
        conversation.push(input);

        for iteration in 1..=self.config.max_iterations {
            if let Some(text) = self.step(&mut conversation).await? {
                return Ok(RunOutcome::Completed {
                    text,
                    iterations: iteration,
                });
            }
        }

        tracing::warn!(
            max_iterations = self.config.max_iterations,
            "Iteration budget exhausted"
        );
        Ok(RunOutcome::BudgetExceeded {
            iterations: self.config.max_iterations,
        })
    }

    /// Run with a plain text prompt
    pub async fn ask(&self, prompt: &str) -> Result<RunOutcome> {
        self.run(Turn::user(prompt)).await
    }

    /// One backend round trip plus execution of any requested calls.
    /// Returns the answer text once the backend stops calling tools.
    async fn step(&self, conversation: &mut Conversation) -> Result<Option<String>> {
        let declarations = self.tools.declarations();
        let request = GenerateRequest {
            turns: conversation.turns(),
            tools: &declarations,
            system_instruction: Some(&self.config.system_prompt),
            options: &self.config.generation,
        };

        let generation = self.provider.generate(request).await?;

        let Some(usage) = &generation.usage else {
            return Err(AgentError::MalformedResponse(format!(
                "{} reply carried no usage metadata",
                self.provider.name()
            )));
        };
        tracing::debug!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "Backend replied"
        );

        let calls: Vec<_> = generation.function_calls().cloned().collect();
        let text = generation.text();
        conversation.push(generation.turn);

        if calls.is_empty() {
            self.store.save(conversation)?;
            return Ok(Some(text));
        }

        let mut responses = Vec::with_capacity(calls.len());
        for call in &calls {
            let part = match self.gate.check(call).await {
                GateDecision::Allow => self.tools.dispatch_part(call, &self.sandbox_root).await,
                GateDecision::Deny(reason) => Part::FunctionResponse(FunctionResponse {
                    name: call.name.clone(),
                    response: ToolOutcome::Error(reason),
                }),
            };
            responses.push(part);
        }

        conversation.push(Turn::tool(responses));
        self.store.save(conversation)?;
        Ok(None)
    }

    /// Get the tool registry
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Get configuration
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    tools: Option<Arc<ToolRegistry>>,
    gate: Option<Arc<SecurityGate>>,
    store: Option<Arc<dyn ConversationStore>>,
    sandbox_root: Option<PathBuf>,
    config: AgentConfig,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            tools: None,
            gate: None,
            store: None,
            sandbox_root: None,
            config: AgentConfig::default(),
        }
    }

    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    #[must_use]
    pub fn gate(mut self, gate: Arc<SecurityGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn sandbox_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sandbox_root = Some(root.into());
        self
    }

    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.generation.model = model.into();
        self
    }

    #[must_use]
    pub const fn temperature(mut self, temp: f32) -> Self {
        self.config.generation.temperature = temp;
        self
    }

    #[must_use]
    pub const fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;
        let gate = self
            .gate
            .ok_or_else(|| AgentError::Config("Security gate is required".into()))?;
        let store = self
            .store
            .ok_or_else(|| AgentError::Config("Conversation store is required".into()))?;
        let sandbox_root = self
            .sandbox_root
            .ok_or_else(|| AgentError::Config("Sandbox root is required".into()))?;
        if self.config.max_iterations == 0 {
            return Err(AgentError::Config("max_iterations must be at least 1".into()));
        }

        Ok(Agent::new(
            provider,
            self.tools.unwrap_or_default(),
            gate,
            store,
            sandbox_root,
            self.config,
        ))
    }
}
