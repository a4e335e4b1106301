//! Automated Code Reviewer
//!
//! One deterministic backend call per submission. The verdict is an approval
//! only when the reply contains [`APPROVAL_TOKEN`]; transport failures reject.

use std::sync::Arc;

use async_trait::async_trait;

use crate::message::Turn;
use crate::provider::{GenerateRequest, GenerationOptions, LlmProvider};

/// Token the reviewer must emit to approve
pub const APPROVAL_TOKEN: &str = "APPROVED";

pub const REVIEWER_PROMPT: &str = r#"You are a strict security auditor for Python code written by an autonomous agent.

The code will be saved and may be executed inside a sandboxed working directory.
Reject code that:
- deletes, moves or overwrites files outside the current working directory
- spawns shells or runs arbitrary system commands (os.system, subprocess with shell=True, eval/exec on untrusted input)
- reads credentials, environment secrets, SSH keys or browser data
- opens network listeners or sends data to remote hosts without an obvious task-related reason
- contains obfuscated code, infinite loops without exit conditions, or fork bombs

If the code is safe, answer with the single word APPROVED.
Otherwise answer REJECTED followed by a short list of the concrete problems and how to fix them."#;

/// Outcome of one review
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReviewVerdict {
    pub approved: bool,
    pub feedback: String,
}

impl ReviewVerdict {
    pub fn approve() -> Self {
        Self {
            approved: true,
            feedback: "Code looks safe.".into(),
        }
    }

    pub fn reject(feedback: impl Into<String>) -> Self {
        Self {
            approved: false,
            feedback: feedback.into(),
        }
    }
}

/// Source-code reviewer port
#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn review(&self, source: &str) -> ReviewVerdict;
}

/// Reviewer backed by a reasoning backend
pub struct LlmReviewer {
    provider: Arc<dyn LlmProvider>,
    options: GenerationOptions,
}

impl LlmReviewer {
    /// `options.temperature` is ignored; reviews always run at zero.
    pub fn new(provider: Arc<dyn LlmProvider>, options: &GenerationOptions) -> Self {
        Self {
            provider,
            options: options.deterministic(),
        }
    }
}

#[async_trait]
impl Reviewer for LlmReviewer {
    async fn review(&self, source: &str) -> ReviewVerdict {
        tracing::info!(bytes = source.len(), "Reviewing generated code");

        let turns = [Turn::user(format!(
            "CODE TO REVIEW:\n```python\n{source}\n```"
        ))];
        let request = GenerateRequest {
            turns: &turns,
            tools: &[],
            system_instruction: Some(REVIEWER_PROMPT),
            options: &self.options,
        };

        match self.provider.generate(request).await {
            Ok(generation) => {
                let verdict = generation.text().trim().to_string();
                if verdict.contains(APPROVAL_TOKEN) {
                    tracing::info!("Reviewer approved code");
                    ReviewVerdict::approve()
                } else {
                    tracing::warn!(%verdict, "Reviewer rejected code");
                    ReviewVerdict::reject(verdict)
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Reviewer unavailable, rejecting");
                ReviewVerdict::reject(format!("Reviewer failed: {e}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AgentError, Result};
    use crate::provider::{Generation, TokenUsage};
    use std::sync::Mutex;

    /// Backend double returning a fixed reply and recording the request
    struct CannedBackend {
        reply: std::result::Result<String, String>,
        seen_temperature: Mutex<Option<f32>>,
        seen_tools: Mutex<Option<usize>>,
    }

    impl CannedBackend {
        fn new(reply: std::result::Result<&str, &str>) -> Self {
            Self {
                reply: reply.map(str::to_string).map_err(str::to_string),
                seen_temperature: Mutex::new(None),
                seen_tools: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for CannedBackend {
        fn name(&self) -> &str {
            "canned"
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        async fn generate(&self, request: GenerateRequest<'_>) -> Result<Generation> {
            *self.seen_temperature.lock().unwrap() = Some(request.options.temperature);
            *self.seen_tools.lock().unwrap() = Some(request.tools.len());
            match &self.reply {
                Ok(text) => Ok(Generation {
                    turn: Turn::model(text.clone()),
                    model: "canned".into(),
                    usage: Some(TokenUsage {
                        prompt_tokens: 1,
                        completion_tokens: 1,
                        total_tokens: 2,
                    }),
                }),
                Err(e) => Err(AgentError::ProviderUnavailable(e.clone())),
            }
        }
    }

    async fn review_with(reply: std::result::Result<&str, &str>) -> (ReviewVerdict, Arc<CannedBackend>) {
        let backend = Arc::new(CannedBackend::new(reply));
        let reviewer = LlmReviewer::new(backend.clone(), &GenerationOptions::default());
        (reviewer.review("print('hi')").await, backend)
    }

    #[tokio::test]
    async fn test_approval_token_anywhere_approves() {
        let (verdict, backend) = review_with(Ok("Looks fine.\nAPPROVED")).await;
        assert!(verdict.approved);
        assert_eq!(*backend.seen_temperature.lock().unwrap(), Some(0.0));
        assert_eq!(*backend.seen_tools.lock().unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_other_text_rejects_with_full_feedback() {
        let (verdict, _) = review_with(Ok("REJECTED: uses os.system")).await;
        assert!(!verdict.approved);
        assert_eq!(verdict.feedback, "REJECTED: uses os.system");
    }

    #[tokio::test]
    async fn test_transport_failure_fails_closed() {
        let (verdict, _) = review_with(Err("connection refused")).await;
        assert!(!verdict.approved);
        assert!(verdict.feedback.starts_with("Reviewer failed:"));
        assert!(verdict.feedback.contains("connection refused"));
    }
}
