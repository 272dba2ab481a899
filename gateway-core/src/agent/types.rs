//! Types shared by the agent orchestrator (C6, spec.md §5).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::message::{LlmUsage, ToolCall, ToolResult};

/// One turn's worth of conversation history, in the gateway's
/// format-neutral shape — the host's adapter (Chat or Responses) is
/// responsible for translating to/from this before/after the orchestrator
/// runs (spec.md §5.1).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub tool_results: Vec<ToolResult>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    System,
    User,
    Assistant,
    Tool,
}

/// What the host's LLM returned for one turn.
#[derive(Clone, Debug, Default)]
pub struct LlmTurn {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<LlmUsage>,
}

/// The callback the host supplies so the orchestrator never has to know how
/// to reach any particular LLM provider (spec.md §5's "host supplies the
/// model" non-goal: the gateway only decides *when* to call the model
/// again, never *how*).
#[async_trait]
pub trait LlmInvoker: Send + Sync {
    async fn invoke(&self, history: &[ConversationTurn]) -> Result<LlmTurn, GatewayError>;
}

/// How a requested tool call was classified against its client's
/// `toolsToAutoExecute` filter (spec.md §5.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionClass {
    /// Within `toolsToAutoExecute`: run immediately.
    Auto,
    /// Outside `toolsToAutoExecute` but within `toolsToExecute`: the host
    /// must approve before the orchestrator will run it.
    RequiresApproval,
}

/// A tool call the orchestrator wants to run but which needs approval
/// before it can.
#[derive(Clone, Debug)]
pub struct PendingApproval {
    pub call: ToolCall,
}

/// What one `step` of the orchestrator produced.
pub enum StepOutcome {
    /// The LLM produced no tool calls: the conversation is done for now.
    /// Carries the full history, including the final assistant turn.
    Finished(Vec<ConversationTurn>),
    /// All tool calls this turn were auto-executable and have been run;
    /// the updated history is ready for another LLM turn.
    Continue(Vec<ConversationTurn>),
    /// At least one tool call requires approval before the orchestrator can
    /// proceed; the auto-executable calls from the same turn still ran.
    NeedsApproval {
        history_so_far: Vec<ConversationTurn>,
        pending: Vec<PendingApproval>,
    },
    /// `maxDepth` was reached without the LLM finishing on its own.
    DepthExceeded(Vec<ConversationTurn>),
}
