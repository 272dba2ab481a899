//! Gateway error taxonomy.
//!
//! The gateway distinguishes error *kinds* (spec table in README) rather than
//! a flat list of types, so dispatcher, agent, and sandbox code can all ask
//! "does this surface as a tool-result, or does it bubble up to the host?"
//! without matching on a growing enum of unrelated variants. See
//! [`GatewayError::to_tool_result`] for the "always feed something back to
//! the LLM" propagation policy.

use crate::message::ToolResult;

/// Coarse classification of [`GatewayError`], matching the error taxonomy.
///
/// Every kind except [`ErrorKind::Agent`] is recoverable at the tool-result
/// boundary: the dispatcher/orchestrator turns it into a `ToolResult` with
/// `is_error = true` instead of propagating a Rust-level error to the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed arguments, unknown tool name.
    Validation,
    /// Tool not in `toolsToExecute`, or filtered out by the request context.
    Permission,
    /// Per-call or per-script deadline exceeded.
    Timeout,
    /// Subprocess exit, socket failure, or other transport-layer failure.
    Transport,
    /// The tool ran and reported an error through MCP's `isError` convention.
    Tool,
    /// A plugin panicked or explicitly rejected the request.
    Plugin,
    /// Agent-level failure with no recovery path (depth exceeded with no
    /// progress possible, or the LLM callback itself failed).
    Agent,
}

/// The gateway's single error type.
///
/// `thiserror`-derived, in the house style of the teacher's `AgentError`: one
/// variant per error kind, each carrying just enough context to explain
/// itself in a tool-result's content string.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("permission: {0}")]
    Permission(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("transport: {0}")]
    Transport(String),

    #[error("tool error: {0}")]
    Tool(String),

    #[error("plugin: {0}")]
    Plugin(String),

    #[error("agent: {0}")]
    Agent(String),
}

impl GatewayError {
    /// Returns the coarse [`ErrorKind`] for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Validation(_) => ErrorKind::Validation,
            GatewayError::Permission(_) => ErrorKind::Permission,
            GatewayError::Timeout(_) => ErrorKind::Timeout,
            GatewayError::Transport(_) => ErrorKind::Transport,
            GatewayError::Tool(_) => ErrorKind::Tool,
            GatewayError::Plugin(_) => ErrorKind::Plugin,
            GatewayError::Agent(_) => ErrorKind::Agent,
        }
    }

    /// True when this error kind is one the orchestrator/dispatcher must
    /// swallow into a tool-result rather than propagate; only [`ErrorKind::Agent`]
    /// is allowed to bubble up to the host as a Rust-level `Err`.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Agent)
    }

    /// Converts this error into a `ToolResult` carrying `is_error = true`,
    /// per spec.md §7's propagation policy: "every tool invocation produces
    /// a tool-result message, even on failure."
    ///
    /// `call_id` is threaded through so the caller does not need to
    /// reconstruct the association between call and result.
    pub fn to_tool_result(&self, call_id: impl Into<String>) -> ToolResult {
        ToolResult {
            call_id: call_id.into(),
            content: self.to_string(),
            is_error: true,
        }
    }
}
