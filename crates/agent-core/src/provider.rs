//! Reasoning Backend Port
//!
//! Defines a common interface for reasoning backends (Gemini, Ollama, ...)
//! allowing the agent to work with any of them without code changes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_core::provider::{GenerateRequest, GenerationOptions, LlmProvider};
//!
//! let request = GenerateRequest {
//!     turns: conversation.turns(),
//!     tools: &registry.declarations(),
//!     system_instruction: Some(SYSTEM_PROMPT),
//!     options: &GenerationOptions::default(),
//! };
//! let generation = provider.generate(request).await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::{FunctionCall, Turn};
use crate::tool::ToolDeclaration;

/// Configuration for generation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model identifier (e.g., "gemini-2.5-flash", "llama3.2")
    pub model: String,

    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Top-p nucleus sampling
    #[serde(default = "default_top_p")]
    pub top_p: f32,
}

const fn default_temperature() -> f32 {
    0.7
}
const fn default_max_tokens() -> u32 {
    8192
}
const fn default_top_p() -> f32 {
    0.95
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
        }
    }
}

impl GenerationOptions {
    /// Same options with sampling pinned to deterministic
    #[must_use]
    pub fn deterministic(&self) -> Self {
        Self {
            temperature: 0.0,
            ..self.clone()
        }
    }
}

/// One request to the backend
#[derive(Clone, Copy, Debug)]
pub struct GenerateRequest<'a> {
    /// Full working conversation
    pub turns: &'a [Turn],

    /// Active tool catalog (empty for tool-less calls)
    pub tools: &'a [ToolDeclaration],

    /// System role text
    pub system_instruction: Option<&'a str>,

    pub options: &'a GenerationOptions,
}

/// Token usage statistics
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Backend reply
#[derive(Clone, Debug)]
pub struct Generation {
    /// The model turn (text and/or function calls)
    pub turn: Turn,

    /// Model that generated this response
    pub model: String,

    /// Usage metadata; every well-formed reply carries it
    pub usage: Option<TokenUsage>,
}

impl Generation {
    /// Answer text of the turn
    pub fn text(&self) -> String {
        self.turn.text()
    }

    /// Function calls in request order
    pub fn function_calls(&self) -> impl Iterator<Item = &FunctionCall> {
        self.turn.function_calls()
    }
}

/// Strategy trait for reasoning backends
///
/// Implement this trait to add support for new backends.
/// The agent works exclusively through this interface.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logs (e.g., "Gemini", "Ollama")
    fn name(&self) -> &str;

    /// Check if the provider is available and configured correctly
    async fn health_check(&self) -> Result<bool>;

    /// Send the conversation and tool catalog, receive one model turn
    async fn generate(&self, request: GenerateRequest<'_>) -> Result<Generation>;
}
