//! # agent-core
//!
//! Tool-calling agent loop with a sandboxed file/process accessor, a
//! review-and-approval gate, and a persistent conversation store.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Agent                               │
//! │  ┌─────────────┐  ┌──────────────┐  ┌─────────────────────┐   │
//! │  │    Loop     │──│ SecurityGate │──│    ToolRegistry     │   │
//! │  │ (reasoning) │  │ review+human │  │  sources → catalog  │   │
//! │  └──────┬──────┘  └──────────────┘  └──────────┬──────────┘   │
//! │         │                                      │              │
//! │  ┌──────┴──────┐  ┌──────────────┐  ┌──────────┴──────────┐   │
//! │  │ LlmProvider │  │ Conversation │  │      Sandbox        │   │
//! │  │ (strategy)  │  │    Store     │  │  root-confined I/O  │   │
//! │  └─────────────┘  └──────────────┘  └─────────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait lets the loop run against Gemini, Ollama or a
//! scripted test double without changes.

pub mod error;
pub mod message;
pub mod provider;
pub mod reasoning;
pub mod review;
pub mod sandbox;
pub mod security;
pub mod session;
pub mod tool;

pub use error::{AgentError, Result};
pub use message::{Conversation, FunctionCall, Part, Role, ToolOutcome, Turn};
pub use provider::{GenerateRequest, Generation, GenerationOptions, LlmProvider, TokenUsage};
pub use reasoning::{Agent, AgentBuilder, AgentConfig, RunOutcome};
pub use review::{LlmReviewer, ReviewVerdict, Reviewer};
pub use sandbox::{ExecReport, Sandbox, SandboxError, SandboxLimits};
pub use security::{ApprovalPort, GateConfig, GateDecision, SecurityGate};
pub use session::{ConversationStore, FileConversationStore, MemoryConversationStore, SessionId};
pub use tool::{Tool, ToolDeclaration, ToolRegistry, ToolSource};
