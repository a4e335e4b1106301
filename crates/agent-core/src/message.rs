//! Conversation Turns
//!
//! Role-tagged turns made of ordered parts. Turns are immutable once pushed
//! onto a [`Conversation`]; the only mutation a conversation supports is
//! appending.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::session::SessionId;

/// Role of a turn's author
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Human (or user-facing edge) input
    User,
    /// Reasoning backend output
    Model,
    /// Results of executed tool calls
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Model => write!(f, "model"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// A function call requested by the backend
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,

    #[serde(default)]
    pub args: Map<String, Value>,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// String argument lookup
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }
}

/// Outcome of one function call, as the backend sees it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolOutcome {
    Result(String),
    Error(String),
}

impl ToolOutcome {
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Result(s) | Self::Error(s) => s,
        }
    }
}

/// Result of one function call, paired with the call's name
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: ToolOutcome,
}

/// Smallest unit of turn content
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text {
        text: String,
    },
    Media {
        mime_type: String,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    FunctionCall(FunctionCall),
    FunctionResponse(FunctionResponse),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn media(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self::Media {
            mime_type: mime_type.into(),
            data,
        }
    }

    pub fn call(name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self::FunctionCall(FunctionCall::new(name, args))
    }

    pub fn function_result(name: impl Into<String>, result: impl Into<String>) -> Self {
        Self::FunctionResponse(FunctionResponse {
            name: name.into(),
            response: ToolOutcome::Result(result.into()),
        })
    }

    pub fn function_error(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self::FunctionResponse(FunctionResponse {
            name: name.into(),
            response: ToolOutcome::Error(error.into()),
        })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// One role-tagged, ordered group of parts
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Turn {
    pub const fn new(role: Role, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }

    /// Single-part user turn
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::text(text)])
    }

    /// Single-part model turn
    pub fn model(text: impl Into<String>) -> Self {
        Self::new(Role::Model, vec![Part::text(text)])
    }

    pub const fn tool(parts: Vec<Part>) -> Self {
        Self::new(Role::Tool, parts)
    }

    /// Concatenated text parts
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("")
    }

    /// Function calls carried by this turn, in order
    pub fn function_calls(&self) -> impl Iterator<Item = &FunctionCall> {
        self.parts.iter().filter_map(|p| match p {
            Part::FunctionCall(call) => Some(call),
            _ => None,
        })
    }

    pub fn has_function_calls(&self) -> bool {
        self.function_calls().next().is_some()
    }
}

/// Ordered conversation history
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    id: SessionId,
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn from_parts(id: SessionId, turns: Vec<Turn>) -> Self {
        Self { id, turns }
    }

    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    /// Append a turn
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Get all turns
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Get the last turn
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Number of turns
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_turn_creation() {
        let turn = Turn::user("Hello");
        assert_eq!(turn.role, Role::User);
        assert_eq!(turn.text(), "Hello");
        assert!(!turn.has_function_calls());
    }

    #[test]
    fn test_function_calls_keep_order() {
        let turn = Turn::new(
            Role::Model,
            vec![
                Part::text("Let me look."),
                Part::call("get_files_info", Map::new()),
                Part::call("get_file_content", Map::new()),
            ],
        );
        let names: Vec<_> = turn.function_calls().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["get_files_info", "get_file_content"]);
        assert_eq!(turn.text(), "Let me look.");
    }

    #[test]
    fn test_function_response_wire_shape() {
        let part = Part::function_error("write_file", "User denied execution of this function.");
        let value = serde_json::to_value(&part).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "function_response",
                "name": "write_file",
                "response": {"error": "User denied execution of this function."}
            })
        );
    }

    #[test]
    fn test_media_part_is_base64() {
        let part = Part::media("image/png", vec![0x89, b'P', b'N', b'G']);
        let value = serde_json::to_value(&part).unwrap();
        assert_eq!(value["data"], "iVBORw==");
        let back: Part = serde_json::from_value(value).unwrap();
        assert_eq!(back, part);
    }

    #[test]
    fn test_conversation() {
        let mut conv = Conversation::new();
        conv.push(Turn::user("Hi"));
        conv.push(Turn::model("Hello!"));

        assert_eq!(conv.len(), 2);
        assert_eq!(conv.last().unwrap().role, Role::Model);
    }
}
