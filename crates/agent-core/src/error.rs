//! Error Types

use thiserror::Error;

use crate::sandbox::SandboxError;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// Reasoning backend error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Backend reply is missing metadata every well-formed reply carries
    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),

    /// Access refused by the sandbox, the reviewer or the operator
    #[error("{0}")]
    Denied(String),

    /// Tool not found in registry
    #[error("Unknown function: {0}")]
    ToolNotFound(String),

    /// Tool validation failed
    #[error("Tool validation error: {0}")]
    ToolValidation(String),

    /// Tool execution failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Subprocess exceeded its wall-clock limit
    #[error("Execution timed out after {0} seconds (the program may contain an infinite loop)")]
    Timeout(u64),

    /// Conversation store error
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limited
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Check if error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable(_) | Self::RateLimited(_) | Self::Io(_)
        )
    }

    /// Whether the error is folded back into the conversation as tool content
    /// instead of aborting the invocation.
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Denied(_)
                | Self::ToolNotFound(_)
                | Self::ToolValidation(_)
                | Self::ToolExecution(_)
                | Self::Timeout(_)
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Provider(msg) => format!("The AI service encountered an error: {msg}"),
            Self::ProviderUnavailable(_) => {
                "The AI service is currently unavailable. Please try again.".into()
            }
            Self::MalformedResponse(_) => {
                "The AI service returned a malformed response. The request was aborted.".into()
            }
            Self::RateLimited(_) => "You've made too many requests. Please wait a moment.".into(),
            Self::Auth(_) => "Authentication failed. Please check your credentials.".into(),
            Self::Store(msg) => format!("Conversation history error: {msg}"),
            Self::Config(msg) => format!("Configuration error: {msg}"),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<SandboxError> for AgentError {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::OutsideRoot { .. } => Self::Denied(err.to_string()),
            SandboxError::Timeout(secs) => Self::Timeout(secs),
            SandboxError::Io(e) => Self::Io(e),
            other => Self::ToolExecution(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_taxonomy() {
        assert!(AgentError::Denied("no".into()).is_recoverable());
        assert!(AgentError::Timeout(30).is_recoverable());
        assert!(AgentError::ToolNotFound("x".into()).is_recoverable());
        assert!(!AgentError::MalformedResponse("no usage".into()).is_recoverable());
        assert!(!AgentError::Provider("boom".into()).is_recoverable());
    }

    #[test]
    fn test_sandbox_denial_maps_to_denied() {
        let err: AgentError = SandboxError::OutsideRoot {
            path: "../x".into(),
        }
        .into();
        assert!(matches!(err, AgentError::Denied(_)));
        assert!(err.to_string().contains("outside the permitted working directory"));
    }
}
