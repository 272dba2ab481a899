//! Chat Completions-shape message normalization (spec.md §5.3).
//!
//! Field names and the `tool_calls[].function.{name,arguments}` nesting
//! match the OpenAI Chat Completions API, the same wire shape the
//! teacher's `openai_sse::request::ChatCompletionRequest` parses (spec.md
//! supplement: this module additionally renders the reply direction, which
//! the teacher's read-only SSE adapter never needed to do).

use serde::{Deserialize, Serialize};

use crate::agent::{ConversationTurn, TurnRole};
use crate::message::{ToolCall, ToolResult};

/// One message in Chat Completions shape.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ChatToolCall>,
    /// Present only on `role: "tool"` messages: the call this result
    /// answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: ChatFunctionCall,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatFunctionCall {
    pub name: String,
    /// Raw JSON-encoded arguments, exactly as OpenAI sends/expects them.
    pub arguments: String,
}

/// Converts a Chat Completions message list into the gateway's internal
/// turns.
pub fn parse_chat_messages(messages: &[ChatMessage]) -> Vec<ConversationTurn> {
    messages
        .iter()
        .map(|m| {
            let role = match m.role.as_str() {
                "system" => TurnRole::System,
                "user" => TurnRole::User,
                "tool" => TurnRole::Tool,
                _ => TurnRole::Assistant,
            };
            let tool_calls: Vec<ToolCall> = m
                .tool_calls
                .iter()
                .map(|tc| ToolCall {
                    call_id: tc.id.clone(),
                    tool_name: tc.function.name.clone(),
                    arguments_json: tc.function.arguments.clone(),
                })
                .collect();
            let tool_results = if role == TurnRole::Tool {
                vec![ToolResult {
                    call_id: m.tool_call_id.clone().unwrap_or_default(),
                    content: m.content.clone().unwrap_or_default(),
                    is_error: false,
                }]
            } else {
                vec![]
            };
            ConversationTurn {
                role,
                content: m.content.clone().unwrap_or_default(),
                tool_calls,
                tool_results,
            }
        })
        .collect()
}

/// Converts internal turns back into Chat Completions messages: one
/// `assistant` message per turn with tool calls, one `tool` message per
/// tool result (OpenAI requires tool results as separate messages keyed by
/// `tool_call_id`, not bundled onto the assistant turn).
pub fn render_chat_messages(turns: &[ConversationTurn]) -> Vec<ChatMessage> {
    let mut out = Vec::new();
    for turn in turns {
        let role = match turn.role {
            TurnRole::System => "system",
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
            TurnRole::Tool => "tool",
        };
        if turn.role == TurnRole::Tool {
            for result in &turn.tool_results {
                out.push(ChatMessage {
                    role: "tool".to_string(),
                    content: Some(result.content.clone()),
                    tool_calls: vec![],
                    tool_call_id: Some(result.call_id.clone()),
                });
            }
            continue;
        }
        out.push(ChatMessage {
            role: role.to_string(),
            content: if turn.content.is_empty() { None } else { Some(turn.content.clone()) },
            tool_calls: turn
                .tool_calls
                .iter()
                .map(|tc| ChatToolCall {
                    id: tc.call_id.clone(),
                    call_type: "function".to_string(),
                    function: ChatFunctionCall {
                        name: tc.tool_name.clone(),
                        arguments: tc.arguments_json.clone(),
                    },
                })
                .collect(),
            tool_call_id: None,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_an_assistant_tool_call_and_its_result() {
        let turns = vec![
            ConversationTurn {
                role: TurnRole::User,
                content: "what's the weather".into(),
                tool_calls: vec![],
                tool_results: vec![],
            },
            ConversationTurn {
                role: TurnRole::Assistant,
                content: String::new(),
                tool_calls: vec![ToolCall {
                    call_id: "call_1".into(),
                    tool_name: "demo-get_weather".into(),
                    arguments_json: "{\"city\":\"nyc\"}".into(),
                }],
                tool_results: vec![],
            },
            ConversationTurn {
                role: TurnRole::Tool,
                content: String::new(),
                tool_calls: vec![],
                tool_results: vec![ToolResult::ok("call_1", "sunny")],
            },
        ];

        let rendered = render_chat_messages(&turns);
        assert_eq!(rendered.len(), 3);
        assert_eq!(rendered[1].tool_calls[0].function.name, "demo-get_weather");
        assert_eq!(rendered[2].role, "tool");
        assert_eq!(rendered[2].tool_call_id.as_deref(), Some("call_1"));

        let parsed = parse_chat_messages(&rendered);
        assert_eq!(parsed[1].tool_calls[0].tool_name, "demo-get_weather");
        assert_eq!(parsed[2].tool_results[0].content, "sunny");
    }
}
