//! API adapters: translate between the gateway's format-neutral
//! [`crate::agent::ConversationTurn`]/[`crate::message::ToolCall`] shapes and
//! the two LLM message wire formats a host might be speaking to its model in
//! (C7, spec.md §5.3).
//!
//! Modelled on the teacher's `openai_sse::request` DTOs: one module per wire
//! shape, `snake_case` field names matching the upstream API exactly, and a
//! pure `parse_*`/`render_*` function pair per direction rather than a
//! `Serialize`/`Deserialize` impl on the internal type (the internal type
//! should not know about either wire format).

pub mod chat;
pub mod responses;

pub use chat::{ChatMessage, ChatToolCall};
pub use responses::{ResponsesInputItem, ResponsesToolCall};
