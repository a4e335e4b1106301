//! Ollama LLM Provider
//!
//! Implementation of `LlmProvider` for local Ollama inference via the
//! non-streaming `/api/chat` endpoint with native tool calling.

use std::time::Duration;

use agent_core::{
    error::{AgentError, Result},
    message::{FunctionCall, Part, Role, ToolOutcome, Turn},
    provider::{GenerateRequest, Generation, GenerationOptions, LlmProvider, TokenUsage},
};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::http::{check_status, transport_error};

/// Ollama provider configuration
#[derive(Clone, Debug)]
pub struct OllamaConfig {
    /// Ollama host URL
    pub host: String,

    /// Ollama port
    pub port: u16,

    /// Connection timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost".into(),
            port: 11434,
            timeout_secs: 120,
        }
    }
}

impl OllamaConfig {
    fn base_url(&self) -> String {
        format!("{}:{}", self.host.trim_end_matches('/'), self.port)
    }
}

/// Ollama LLM provider
pub struct OllamaProvider {
    client: reqwest::Client,
    config: OllamaConfig,
}

impl OllamaProvider {
    /// Create a new Ollama provider with custom host/port
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        Self::from_config(OllamaConfig {
            host: host.into(),
            port,
            ..Default::default()
        })
    }

    /// Create from configuration
    pub fn from_config(config: OllamaConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Create with default localhost settings
    pub fn localhost() -> Result<Self> {
        Self::from_config(OllamaConfig::default())
    }

    /// Tool messages are plain text, so failures carry an `Error:` prefix.
    fn tool_content(outcome: &ToolOutcome) -> String {
        match outcome {
            ToolOutcome::Result(text) => text.clone(),
            ToolOutcome::Error(text) if text.starts_with("Error:") => text.clone(),
            ToolOutcome::Error(text) => format!("Error: {text}"),
        }
    }

    /// Convert turns to Ollama chat messages.
    ///
    /// Ollama has no multi-part messages: a tool turn becomes one `tool`
    /// message per function response, and media rides along as `images`.
    fn convert_turns(system: Option<&str>, turns: &[Turn]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        if let Some(system) = system {
            messages.push(ChatMessage::new("system", system));
        }

        for turn in turns {
            match turn.role {
                Role::Tool => {
                    for part in &turn.parts {
                        if let Part::FunctionResponse(response) = part {
                            let mut message =
                                ChatMessage::new("tool", Self::tool_content(&response.response));
                            message.tool_name = Some(response.name.clone());
                            messages.push(message);
                        }
                    }
                }
                Role::User | Role::Model => {
                    let role = if turn.role == Role::User { "user" } else { "assistant" };
                    let mut message = ChatMessage::new(role, turn.text());
                    for part in &turn.parts {
                        match part {
                            Part::Media { data, .. } => message.images.push(STANDARD.encode(data)),
                            Part::FunctionCall(call) => message.tool_calls.push(ChatToolCall {
                                function: ChatFunction {
                                    name: call.name.clone(),
                                    arguments: call.args.clone(),
                                },
                            }),
                            Part::Text { .. } | Part::FunctionResponse(_) => {}
                        }
                    }
                    messages.push(message);
                }
            }
        }
        messages
    }

    /// Build Ollama generation options
    fn build_options(opts: &GenerationOptions) -> Value {
        json!({
            "temperature": opts.temperature,
            "top_p": opts.top_p,
            "num_predict": opts.max_tokens,
        })
    }

    fn build_body(request: &GenerateRequest<'_>) -> ChatRequest {
        ChatRequest {
            model: request.options.model.clone(),
            messages: Self::convert_turns(request.system_instruction, request.turns),
            tools: request
                .tools
                .iter()
                .map(|decl| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": decl.name,
                            "description": decl.description,
                            "parameters": decl.parameters,
                        }
                    })
                })
                .collect(),
            stream: false,
            options: Self::build_options(request.options),
        }
    }

    /// Convert Ollama response to a generation
    fn convert_response(response: ChatResponse) -> Generation {
        let mut parts = Vec::new();
        if !response.message.content.is_empty() {
            parts.push(Part::text(response.message.content));
        }
        parts.extend(
            response
                .message
                .tool_calls
                .into_iter()
                .map(|c| Part::FunctionCall(FunctionCall::new(c.function.name, c.function.arguments))),
        );

        let usage = response.done.then(|| {
            let prompt = response.prompt_eval_count.unwrap_or(0);
            let completion = response.eval_count.unwrap_or(0);
            TokenUsage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt + completion,
            }
        });

        Generation {
            turn: Turn::new(Role::Model, parts),
            model: response.model,
            usage,
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "Ollama"
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.config.base_url());
        match self.client.get(url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                tracing::warn!("Ollama health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn generate(&self, request: GenerateRequest<'_>) -> Result<Generation> {
        let body = Self::build_body(&request);

        tracing::debug!(
            model = %body.model,
            messages = body.messages.len(),
            tools = body.tools.len(),
            "Calling Ollama chat"
        );

        let response = self
            .client
            .post(format!("{}/api/chat", self.config.base_url()))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let response = check_status(response).await?;
        let wire: ChatResponse = response
            .json()
            .await
            .map_err(|e| AgentError::MalformedResponse(e.to_string()))?;

        Ok(Self::convert_response(wire))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    stream: bool,
    options: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ChatToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            images: Vec::new(),
            tool_calls: Vec::new(),
            tool_name: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatToolCall {
    function: ChatFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatFunction {
    name: String,
    #[serde(default)]
    arguments: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: String,
    message: ChatMessage,
    #[serde(default)]
    done: bool,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}
