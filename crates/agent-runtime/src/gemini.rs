//! Gemini LLM Provider
//!
//! Implementation of `LlmProvider` over the `generateContent` REST endpoint.

use std::time::Duration;

use agent_core::{
    error::{AgentError, Result},
    message::{FunctionCall, Part, Role, ToolOutcome, Turn},
    provider::{GenerateRequest, Generation, GenerationOptions, LlmProvider, TokenUsage},
    tool::ToolDeclaration,
};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::http::{check_status, transport_error};

/// Gemini provider configuration
#[derive(Clone, Debug)]
pub struct GeminiConfig {
    /// API key sent as `x-goog-api-key`
    pub api_key: String,

    /// API base URL
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            timeout_secs: 120,
        }
    }
}

/// Gemini LLM provider
pub struct GeminiProvider {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::from_config(GeminiConfig::new(api_key))
    }

    /// Create from configuration
    pub fn from_config(config: GeminiConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(AgentError::Config("GEMINI_API_KEY is empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!(
            "{}/models/{model}{method}",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn build_body(request: &GenerateRequest<'_>) -> WireRequest {
        let tools = if request.tools.is_empty() {
            Vec::new()
        } else {
            vec![WireTool {
                function_declarations: request.tools.iter().map(to_wire_declaration).collect(),
            }]
        };

        WireRequest {
            contents: request.turns.iter().map(to_wire_content).collect(),
            system_instruction: request.system_instruction.map(|text| WireContent {
                role: None,
                parts: vec![WirePart::text(text)],
            }),
            tools,
            generation_config: WireGenerationConfig::from(request.options),
        }
    }

    fn convert_response(response: WireResponse, fallback_model: &str) -> Result<Generation> {
        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::MalformedResponse("reply has no candidates".into()))?;

        let parts = candidate
            .content
            .map(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(from_wire_part)
            .collect();

        Ok(Generation {
            turn: Turn::new(Role::Model, parts),
            model: response
                .model_version
                .unwrap_or_else(|| fallback_model.to_string()),
            usage: response.usage_metadata.map(|u| TokenUsage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
            }),
        })
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "Gemini"
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/models", self.config.base_url.trim_end_matches('/'));
        match self
            .client
            .get(url)
            .header("x-goog-api-key", &self.config.api_key)
            .send()
            .await
        {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                tracing::warn!("Gemini health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn generate(&self, request: GenerateRequest<'_>) -> Result<Generation> {
        let model = &request.options.model;
        let body = Self::build_body(&request);

        tracing::debug!(
            model = %model,
            turns = request.turns.len(),
            tools = request.tools.len(),
            "Calling Gemini generateContent"
        );

        let response = self
            .client
            .post(self.endpoint(model, ":generateContent"))
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let response = check_status(response).await?;
        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| AgentError::MalformedResponse(e.to_string()))?;

        Self::convert_response(wire, model)
    }
}

// Wire format

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest {
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    generation_config: WireGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<WireBlob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<WireFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<WireFunctionResponse>,
}

impl WirePart {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireBlob {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    args: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireTool {
    function_declarations: Vec<WireDeclaration>,
}

#[derive(Debug, Serialize)]
struct WireDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    top_p: f32,
}

impl From<&GenerationOptions> for WireGenerationConfig {
    fn from(opts: &GenerationOptions) -> Self {
        Self {
            temperature: opts.temperature,
            max_output_tokens: opts.max_tokens,
            top_p: opts.top_p,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
    usage_metadata: Option<WireUsage>,
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireCandidate {
    content: Option<WireContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

/// Tool turns travel as `user` content, as the API expects
fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User | Role::Tool => "user",
        Role::Model => "model",
    }
}

fn to_wire_content(turn: &Turn) -> WireContent {
    WireContent {
        role: Some(wire_role(turn.role).into()),
        parts: turn.parts.iter().map(to_wire_part).collect(),
    }
}

fn to_wire_part(part: &Part) -> WirePart {
    match part {
        Part::Text { text } => WirePart::text(text),
        Part::Media { mime_type, data } => WirePart {
            inline_data: Some(WireBlob {
                mime_type: mime_type.clone(),
                data: STANDARD.encode(data),
            }),
            ..Default::default()
        },
        Part::FunctionCall(call) => WirePart {
            function_call: Some(WireFunctionCall {
                name: call.name.clone(),
                args: call.args.clone(),
            }),
            ..Default::default()
        },
        Part::FunctionResponse(response) => {
            let payload = match &response.response {
                ToolOutcome::Result(text) => serde_json::json!({ "result": text }),
                ToolOutcome::Error(text) => serde_json::json!({ "error": text }),
            };
            WirePart {
                function_response: Some(WireFunctionResponse {
                    name: response.name.clone(),
                    response: payload,
                }),
                ..Default::default()
            }
        }
    }
}

fn to_wire_declaration(decl: &ToolDeclaration) -> WireDeclaration {
    WireDeclaration {
        name: decl.name.clone(),
        description: decl.description.clone(),
        parameters: decl.parameters.clone(),
    }
}

/// Parts the loop has no use for (e.g. thought signatures) are dropped
fn from_wire_part(part: WirePart) -> Option<Part> {
    if let Some(call) = part.function_call {
        return Some(Part::FunctionCall(FunctionCall::new(call.name, call.args)));
    }
    if let Some(blob) = part.inline_data {
        let data = STANDARD.decode(blob.data).ok()?;
        return Some(Part::media(blob.mime_type, data));
    }
    part.text.map(Part::text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request_json(turns: &[Turn], tools: &[ToolDeclaration]) -> Value {
        let options = GenerationOptions::default();
        let request = GenerateRequest {
            turns,
            tools,
            system_instruction: Some("be careful"),
            options: &options,
        };
        serde_json::to_value(GeminiProvider::build_body(&request)).unwrap()
    }

    #[test]
    fn test_request_maps_roles_and_parts() {
        let turns = vec![
            Turn::new(
                Role::User,
                vec![Part::text("what is in this?"), Part::media("image/png", vec![1, 2, 3])],
            ),
            Turn::new(
                Role::Model,
                vec![Part::call("get_files_info", Map::new())],
            ),
            Turn::tool(vec![
                Part::function_result("get_files_info", "- a.py"),
                Part::function_error("write_file", "User denied execution of this function."),
            ]),
        ];
        let body = request_json(&turns, &[]);

        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][1]["inlineData"]["data"], "AQID");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][1]["parts"][0]["functionCall"]["name"], "get_files_info");
        assert_eq!(body["contents"][2]["role"], "user");
        assert_eq!(
            body["contents"][2]["parts"][0]["functionResponse"]["response"],
            json!({"result": "- a.py"})
        );
        assert_eq!(
            body["contents"][2]["parts"][1]["functionResponse"]["response"]["error"],
            "User denied execution of this function."
        );
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be careful");
        assert!(body.get("tools").is_none());
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 8192);
    }

    #[test]
    fn test_request_carries_function_declarations() {
        let tools = vec![ToolDeclaration::new(
            "get_file_content",
            "Read a file",
            json!({"type": "object", "properties": {"file_path": {"type": "string"}}}),
        )];
        let body = request_json(&[Turn::user("hi")], &tools);
        assert_eq!(
            body["tools"][0]["functionDeclarations"][0]["name"],
            "get_file_content"
        );
    }

    #[test]
    fn test_response_with_calls_and_usage() {
        let wire: WireResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"text": "Let me look."},
                        {"functionCall": {"name": "get_file_content", "args": {"file_path": "main.py"}}}
                    ]
                },
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 4, "totalTokenCount": 16},
            "modelVersion": "gemini-2.5-flash-001"
        }))
        .unwrap();

        let generation = GeminiProvider::convert_response(wire, "gemini-2.5-flash").unwrap();
        assert_eq!(generation.text(), "Let me look.");
        let calls: Vec<_> = generation.function_calls().collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].str_arg("file_path"), Some("main.py"));
        assert_eq!(generation.usage.unwrap().total_tokens, 16);
        assert_eq!(generation.model, "gemini-2.5-flash-001");
    }

    #[test]
    fn test_missing_usage_is_preserved_as_none() {
        let wire: WireResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "hi"}]}}]
        }))
        .unwrap();
        let generation = GeminiProvider::convert_response(wire, "m").unwrap();
        assert!(generation.usage.is_none());
        assert_eq!(generation.model, "m");
    }

    #[test]
    fn test_no_candidates_is_malformed() {
        let wire: WireResponse = serde_json::from_value(json!({"candidates": []})).unwrap();
        let err = GeminiProvider::convert_response(wire, "m").unwrap_err();
        assert!(matches!(err, AgentError::MalformedResponse(_)));
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(
            GeminiProvider::new("  "),
            Err(AgentError::Config(_))
        ));
    }
}
