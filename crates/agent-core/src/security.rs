//! Security Gate
//!
//! Every tool call passes two checks before dispatch, in this order:
//!
//! 1. **Code review**: writes of source files go through the [`Reviewer`];
//!    a rejection denies the call with the reviewer's feedback.
//! 2. **Operator approval**: calls to sensitive tools wait for the
//!    [`ApprovalPort`] to say yes.
//!
//! Denials are returned as values so the loop can fold them into the
//! conversation; nothing here raises.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::message::FunctionCall;
use crate::review::Reviewer;

pub const WRITE_FILE_TOOL: &str = "write_file";

pub const USER_DENIED: &str = "User denied execution of this function.";

/// Human-approval port
#[async_trait]
pub trait ApprovalPort: Send + Sync {
    /// Blocks until the operator decides
    async fn approve(&self, tool_name: &str, args: &Map<String, Value>) -> bool;
}

/// Approves everything (non-interactive runs, tests)
pub struct AutoApprove;

#[async_trait]
impl ApprovalPort for AutoApprove {
    async fn approve(&self, _tool_name: &str, _args: &Map<String, Value>) -> bool {
        true
    }
}

/// Denies everything
pub struct AlwaysDeny;

#[async_trait]
impl ApprovalPort for AlwaysDeny {
    async fn approve(&self, _tool_name: &str, _args: &Map<String, Value>) -> bool {
        false
    }
}

/// Which calls the gate inspects
#[derive(Clone, Debug)]
pub struct GateConfig {
    /// Tools that need operator approval
    pub sensitive_tools: HashSet<String>,

    /// Tools that write files (subject to code review)
    pub file_writing_tools: HashSet<String>,

    /// Extensions (without dot) treated as source code
    pub source_extensions: HashSet<String>,

    /// Argument carrying the target path of a write
    pub path_arg: String,

    /// Argument carrying the content of a write
    pub content_arg: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            sensitive_tools: [WRITE_FILE_TOOL, "run_python_file"]
                .into_iter()
                .map(String::from)
                .collect(),
            file_writing_tools: std::iter::once(WRITE_FILE_TOOL.to_string()).collect(),
            source_extensions: std::iter::once("py".to_string()).collect(),
            path_arg: "file_path".into(),
            content_arg: "content".into(),
        }
    }
}

/// Gate decision for one call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Deny(String),
}

/// Review + approval gate
pub struct SecurityGate {
    config: GateConfig,
    reviewer: Arc<dyn Reviewer>,
    approval: Arc<dyn ApprovalPort>,
}

impl SecurityGate {
    pub fn new(
        config: GateConfig,
        reviewer: Arc<dyn Reviewer>,
        approval: Arc<dyn ApprovalPort>,
    ) -> Self {
        Self {
            config,
            reviewer,
            approval,
        }
    }

    pub const fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn is_sensitive(&self, tool_name: &str) -> bool {
        self.config.sensitive_tools.contains(tool_name)
    }

    /// Whether `call` writes a source file
    pub fn is_code_bearing(&self, call: &FunctionCall) -> bool {
        if !self.config.file_writing_tools.contains(&call.name) {
            return false;
        }
        call.str_arg(&self.config.path_arg)
            .and_then(|p| Path::new(p).extension())
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.config.source_extensions.contains(ext))
    }

    /// Run both checks in order
    pub async fn check(&self, call: &FunctionCall) -> GateDecision {
        if self.is_code_bearing(call) {
            let source = call.str_arg(&self.config.content_arg).unwrap_or_default();
            let verdict = self.reviewer.review(source).await;
            if !verdict.approved {
                return GateDecision::Deny(format!(
                    "Security Review Failed: {}. Please fix the code and try again.",
                    verdict.feedback
                ));
            }
        }

        if self.is_sensitive(&call.name) {
            tracing::info!(tool = %call.name, "Requesting operator approval");
            if !self.approval.approve(&call.name, &call.args).await {
                tracing::warn!(tool = %call.name, "Operator denied tool call");
                return GateDecision::Deny(USER_DENIED.into());
            }
        }

        GateDecision::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::ReviewVerdict;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedReviewer {
        approve: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Reviewer for FixedReviewer {
        async fn review(&self, _source: &str) -> ReviewVerdict {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.approve {
                ReviewVerdict::approve()
            } else {
                ReviewVerdict::reject("REJECTED: deletes files")
            }
        }
    }

    struct CountingApproval {
        answer: bool,
        asked: AtomicUsize,
    }

    #[async_trait]
    impl ApprovalPort for CountingApproval {
        async fn approve(&self, _tool_name: &str, _args: &Map<String, Value>) -> bool {
            self.asked.fetch_add(1, Ordering::SeqCst);
            self.answer
        }
    }

    fn gate(review_ok: bool, approve: bool) -> (SecurityGate, Arc<FixedReviewer>, Arc<CountingApproval>) {
        let reviewer = Arc::new(FixedReviewer {
            approve: review_ok,
            calls: AtomicUsize::new(0),
        });
        let approval = Arc::new(CountingApproval {
            answer: approve,
            asked: AtomicUsize::new(0),
        });
        let gate = SecurityGate::new(GateConfig::default(), reviewer.clone(), approval.clone());
        (gate, reviewer, approval)
    }

    fn call(name: &str, args: Value) -> FunctionCall {
        FunctionCall::new(name, args.as_object().cloned().unwrap_or_default())
    }

    #[tokio::test]
    async fn test_ordinary_call_allowed_without_prompts() {
        let (gate, reviewer, approval) = gate(false, false);
        let decision = gate
            .check(&call("get_file_content", json!({"file_path": "a.py"})))
            .await;
        assert_eq!(decision, GateDecision::Allow);
        assert_eq!(reviewer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(approval.asked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_review_rejection_skips_approval() {
        let (gate, reviewer, approval) = gate(false, true);
        let decision = gate
            .check(&call(
                "write_file",
                json!({"file_path": "tool.py", "content": "import os; os.remove('/')"}),
            ))
            .await;
        let GateDecision::Deny(reason) = decision else {
            panic!("expected denial");
        };
        assert!(reason.contains("REJECTED: deletes files"));
        assert!(reason.starts_with("Security Review Failed"));
        assert_eq!(reviewer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(approval.asked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_source_write_is_not_reviewed() {
        let (gate, reviewer, approval) = gate(false, true);
        let decision = gate
            .check(&call("write_file", json!({"file_path": "notes.txt", "content": "x"})))
            .await;
        assert_eq!(decision, GateDecision::Allow);
        assert_eq!(reviewer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(approval.asked.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_approved_review_still_needs_operator() {
        let (gate, reviewer, approval) = gate(true, false);
        let decision = gate
            .check(&call("write_file", json!({"file_path": "pkg/main.py", "content": "print(1)"})))
            .await;
        assert_eq!(decision, GateDecision::Deny(USER_DENIED.into()));
        assert_eq!(reviewer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(approval.asked.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sensitive_execution_denied() {
        let (gate, _, approval) = gate(true, false);
        let decision = gate
            .check(&call("run_python_file", json!({"file_path": "main.py"})))
            .await;
        assert_eq!(decision, GateDecision::Deny(USER_DENIED.into()));
        assert_eq!(approval.asked.load(Ordering::SeqCst), 1);
    }
}
