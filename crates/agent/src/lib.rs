//! The agent core: a bounded tool-calling loop between the reasoning model
//! and the sales tools, plus the per-turn orchestration around it.
//!
//! Module map:
//! - `llm` - reasoning transcript types and the OpenAI-compatible client
//! - `classify` - tool posture for a turn (greeting / forced issuance / auto)
//! - `extract` - recovery of tool calls embedded in text, reply sanitizing
//! - `tools` - tool menu, argument decoding, dispatch
//! - `issuance` - the quote issuance pipeline (the one state-mutating tool)
//! - `documents` - the document rendering/storage seam
//! - `runtime` - `AgentRuntime`, one inbound message end to end

pub mod classify;
pub mod documents;
pub mod extract;
pub mod issuance;
pub mod llm;
pub mod runtime;
pub mod tools;

pub use documents::{DocumentError, DocumentIssuer, IssuedDocument};
pub use llm::{
    ChatOutcome, ChatRequest, LlmError, OpenAiCompatClient, ReasoningClient, ToolCallRequest,
    ToolChoice,
};
pub use runtime::{AgentRuntime, AgentSettings, InboundTurn};
pub use tools::{ToolOutcome, ToolRouter, TurnContext};
