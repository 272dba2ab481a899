//! Responses-shape message normalization (spec.md §5.3, supplement: the
//! teacher only ever spoke Chat Completions, so this module has no direct
//! teacher precedent; it follows [`super::chat`]'s parse/render pair shape
//! and the OpenAI Responses API's `input[]` item union).

use serde::{Deserialize, Serialize};

use crate::agent::{ConversationTurn, TurnRole};
use crate::message::{ToolCall, ToolResult};

/// One item of a Responses API `input` array.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsesInputItem {
    Message {
        role: String,
        content: String,
    },
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    FunctionCallOutput {
        call_id: String,
        output: String,
    },
}

/// A tool call as it appears in a Responses API model turn (flat, unlike
/// Chat Completions' nested `function` object).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResponsesToolCall {
    pub call_id: String,
    pub name: String,
    pub arguments: String,
}

pub fn parse_responses_input(items: &[ResponsesInputItem]) -> Vec<ConversationTurn> {
    let mut turns = Vec::with_capacity(items.len());
    for item in items {
        match item {
            ResponsesInputItem::Message { role, content } => {
                let role = match role.as_str() {
                    "system" | "developer" => TurnRole::System,
                    "assistant" => TurnRole::Assistant,
                    _ => TurnRole::User,
                };
                turns.push(ConversationTurn {
                    role,
                    content: content.clone(),
                    tool_calls: vec![],
                    tool_results: vec![],
                });
            }
            ResponsesInputItem::FunctionCall { call_id, name, arguments } => {
                turns.push(ConversationTurn {
                    role: TurnRole::Assistant,
                    content: String::new(),
                    tool_calls: vec![ToolCall {
                        call_id: call_id.clone(),
                        tool_name: name.clone(),
                        arguments_json: arguments.clone(),
                    }],
                    tool_results: vec![],
                });
            }
            ResponsesInputItem::FunctionCallOutput { call_id, output } => {
                turns.push(ConversationTurn {
                    role: TurnRole::Tool,
                    content: String::new(),
                    tool_calls: vec![],
                    tool_results: vec![ToolResult {
                        call_id: call_id.clone(),
                        content: output.clone(),
                        is_error: false,
                    }],
                });
            }
        }
    }
    turns
}

pub fn render_responses_input(turns: &[ConversationTurn]) -> Vec<ResponsesInputItem> {
    let mut out = Vec::new();
    for turn in turns {
        match turn.role {
            TurnRole::Tool => {
                for result in &turn.tool_results {
                    out.push(ResponsesInputItem::FunctionCallOutput {
                        call_id: result.call_id.clone(),
                        output: result.content.clone(),
                    });
                }
            }
            _ if !turn.tool_calls.is_empty() => {
                for call in &turn.tool_calls {
                    out.push(ResponsesInputItem::FunctionCall {
                        call_id: call.call_id.clone(),
                        name: call.tool_name.clone(),
                        arguments: call.arguments_json.clone(),
                    });
                }
            }
            _ => {
                let role = match turn.role {
                    TurnRole::System => "system",
                    TurnRole::User => "user",
                    TurnRole::Assistant => "assistant",
                    TurnRole::Tool => unreachable!("handled above"),
                };
                out.push(ResponsesInputItem::Message {
                    role: role.to_string(),
                    content: turn.content.clone(),
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_function_call_and_its_output() {
        let turns = vec![
            ConversationTurn {
                role: TurnRole::User,
                content: "roll a die".into(),
                tool_calls: vec![],
                tool_results: vec![],
            },
            ConversationTurn {
                role: TurnRole::Assistant,
                content: String::new(),
                tool_calls: vec![ToolCall {
                    call_id: "fc_1".into(),
                    tool_name: "demo-roll".into(),
                    arguments_json: "{}".into(),
                }],
                tool_results: vec![],
            },
            ConversationTurn {
                role: TurnRole::Tool,
                content: String::new(),
                tool_calls: vec![],
                tool_results: vec![ToolResult::ok("fc_1", "4")],
            },
        ];

        let rendered = render_responses_input(&turns);
        assert_eq!(rendered.len(), 3);
        matches!(rendered[1], ResponsesInputItem::FunctionCall { .. });

        let parsed = parse_responses_input(&rendered);
        assert_eq!(parsed[1].tool_calls[0].tool_name, "demo-roll");
        assert_eq!(parsed[2].tool_results[0].content, "4");
    }
}
