//! Format-neutral tool call/result types (spec.md §3).
//!
//! These are the internal, wire-shape-agnostic records the dispatcher and
//! agent orchestrator operate on. [`crate::adapter`] is the only place that
//! knows how to turn these into Chat-shape or Responses-shape messages.

use serde::{Deserialize, Serialize};

/// One tool invocation requested by the LLM.
///
/// `tool_name` is always the **qualified** `<clientName>-<toolName>` form
/// (spec.md §3) by the time it reaches the [`crate::dispatcher::Dispatcher`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    /// Raw JSON-encoded arguments, preserved byte-for-byte until parsed.
    pub arguments_json: String,
}

/// The outcome of executing one [`ToolCall`].
///
/// A tool that ran and reported an error still produces a `ToolResult` with
/// `is_error = true` rather than a Rust-level `Err` — only transport/timeout
/// failures and agent-level failures are different from "the tool ran".
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolResult {
    pub call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

/// Token usage for one LLM call, when the host's LLM callback reports it.
///
/// Mirrors the teacher's `LlmUsage` shape; optional everywhere since the
/// gateway never calls an LLM itself (spec.md §1 Non-goals) — it only
/// forwards whatever the host's callback returns.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}
