//! External interface surface (C1-C8 wired together, spec.md §6).
//!
//! A [`Gateway`] owns the [`Manager`], [`Dispatcher`], and (when at least one
//! client is code-mode-enabled) the [`CodeSandbox`]. [`GatewayBuilder`]
//! constructs one from a list of [`ClientConfig`]s, registering the
//! `bifrostInternal` built-in client automatically.
//!
//! The four functions spec.md §6 names as the host-facing surface —
//! `executeChatMCPTool`, `executeResponsesMCPTool`,
//! `checkAndExecuteAgentForChatRequest`, `checkAndExecuteAgentForResponsesRequest`
//! — are [`Gateway`] methods here rather than free functions, since all four
//! need the same manager/dispatcher pair; a host wires one `Gateway` per
//! process and calls these methods from its request handlers.

use std::sync::Arc;

use crate::adapter::chat::{parse_chat_messages, render_chat_messages, ChatMessage, ChatToolCall};
use crate::adapter::responses::{
    parse_responses_input, render_responses_input, ResponsesInputItem, ResponsesToolCall,
};
use crate::agent::{AgentOrchestrator, LlmInvoker, PendingApproval, StepOutcome};
use crate::builtin::register_builtin_client;
use crate::client::Client;
use crate::config::ClientConfig;
use crate::context::RequestContext;
use crate::dispatcher::Dispatcher;
use crate::error::GatewayError;
use crate::manager::Manager;
use crate::message::ToolCall;
use crate::plugin::PluginPipeline;
use crate::sandbox::{CodeSandbox, SandboxBudget};

/// Why an agent run stopped, independent of wire shape (spec.md §3's Agent
/// Loop State termination conditions).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinishReason {
    /// The model returned no tool calls, or every tool call in the final
    /// turn requires approval.
    Stop,
    /// `maxDepth` was reached without the model finishing on its own.
    Length,
}

/// Outcome of driving the agent loop on a Chat-shape conversation.
pub struct ChatAgentResult {
    pub messages: Vec<ChatMessage>,
    /// Tool calls left over from the final turn that the host must approve
    /// before resuming (spec.md §5.2 step 4); empty when the loop finished
    /// cleanly or hit `maxDepth`.
    pub pending_tool_calls: Vec<ChatToolCall>,
    pub finish_reason: FinishReason,
}

/// Outcome of driving the agent loop on a Responses-shape conversation.
pub struct ResponsesAgentResult {
    pub items: Vec<ResponsesInputItem>,
    pub pending_tool_calls: Vec<ResponsesToolCall>,
    pub finish_reason: FinishReason,
}

/// Owns every subsystem a host needs to drive MCP tool execution: the
/// client registry, the dispatcher, and (if any configured client opts in)
/// the code-mode sandbox.
pub struct Gateway {
    manager: Arc<Manager>,
    dispatcher: Arc<Dispatcher>,
    sandbox: Option<Arc<CodeSandbox>>,
}

impl Gateway {
    pub fn manager(&self) -> &Arc<Manager> {
        &self.manager
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn sandbox(&self) -> Option<&Arc<CodeSandbox>> {
        self.sandbox.as_ref()
    }

    /// `executeChatMCPTool` (spec.md §6): runs one Chat-shape tool call
    /// through the dispatcher and renders the answer as a `role: "tool"`
    /// message.
    pub async fn execute_chat_mcp_tool(&self, ctx: &RequestContext, call: ChatToolCall) -> ChatMessage {
        let result = self
            .dispatcher
            .dispatch(
                ctx,
                ToolCall {
                    call_id: call.id,
                    tool_name: call.function.name,
                    arguments_json: call.function.arguments,
                },
            )
            .await;
        ChatMessage {
            role: "tool".to_string(),
            content: Some(result.content),
            tool_calls: vec![],
            tool_call_id: Some(result.call_id),
        }
    }

    /// `executeResponsesMCPTool` (spec.md §6): the Responses-shape
    /// equivalent, rendering the answer as a `function_call_output` item.
    pub async fn execute_responses_mcp_tool(
        &self,
        ctx: &RequestContext,
        call: ResponsesToolCall,
    ) -> ResponsesInputItem {
        let result = self
            .dispatcher
            .dispatch(
                ctx,
                ToolCall {
                    call_id: call.call_id,
                    tool_name: call.name,
                    arguments_json: call.arguments,
                },
            )
            .await;
        ResponsesInputItem::FunctionCallOutput {
            call_id: result.call_id,
            output: result.content,
        }
    }

    /// `checkAndExecuteAgentForChatRequest` (spec.md §6): drives the agent
    /// loop (spec.md §5.2) over a Chat-shape conversation, calling `llm` to
    /// re-invoke the model between turns.
    pub async fn check_and_execute_agent_for_chat_request(
        &self,
        ctx: &RequestContext,
        messages: Vec<ChatMessage>,
        llm: Arc<dyn LlmInvoker>,
        max_depth: u32,
    ) -> Result<ChatAgentResult, GatewayError> {
        let history = parse_chat_messages(&messages);
        let orchestrator = AgentOrchestrator::new(
            Arc::clone(&self.manager),
            Arc::clone(&self.dispatcher),
            llm,
            max_depth,
        );
        let outcome = orchestrator.run(ctx, history).await?;
        Ok(chat_result_from_outcome(outcome))
    }

    /// `checkAndExecuteAgentForResponsesRequest` (spec.md §6): the
    /// Responses-shape equivalent.
    pub async fn check_and_execute_agent_for_responses_request(
        &self,
        ctx: &RequestContext,
        items: Vec<ResponsesInputItem>,
        llm: Arc<dyn LlmInvoker>,
        max_depth: u32,
    ) -> Result<ResponsesAgentResult, GatewayError> {
        let history = parse_responses_input(&items);
        let orchestrator = AgentOrchestrator::new(
            Arc::clone(&self.manager),
            Arc::clone(&self.dispatcher),
            llm,
            max_depth,
        );
        let outcome = orchestrator.run(ctx, history).await?;
        Ok(responses_result_from_outcome(outcome))
    }
}

fn chat_result_from_outcome(outcome: StepOutcome) -> ChatAgentResult {
    match outcome {
        StepOutcome::Finished(history) | StepOutcome::Continue(history) => ChatAgentResult {
            messages: render_chat_messages(&history),
            pending_tool_calls: vec![],
            finish_reason: FinishReason::Stop,
        },
        StepOutcome::NeedsApproval { history_so_far, pending } => ChatAgentResult {
            messages: render_chat_messages(&history_so_far),
            pending_tool_calls: pending.iter().map(pending_to_chat_tool_call).collect(),
            finish_reason: FinishReason::Stop,
        },
        StepOutcome::DepthExceeded(history) => ChatAgentResult {
            messages: render_chat_messages(&history),
            pending_tool_calls: vec![],
            finish_reason: FinishReason::Length,
        },
    }
}

fn responses_result_from_outcome(outcome: StepOutcome) -> ResponsesAgentResult {
    match outcome {
        StepOutcome::Finished(history) | StepOutcome::Continue(history) => ResponsesAgentResult {
            items: render_responses_input(&history),
            pending_tool_calls: vec![],
            finish_reason: FinishReason::Stop,
        },
        StepOutcome::NeedsApproval { history_so_far, pending } => ResponsesAgentResult {
            items: render_responses_input(&history_so_far),
            pending_tool_calls: pending.iter().map(pending_to_responses_tool_call).collect(),
            finish_reason: FinishReason::Stop,
        },
        StepOutcome::DepthExceeded(history) => ResponsesAgentResult {
            items: render_responses_input(&history),
            pending_tool_calls: vec![],
            finish_reason: FinishReason::Length,
        },
    }
}

fn pending_to_chat_tool_call(pending: &PendingApproval) -> ChatToolCall {
    use crate::adapter::chat::ChatFunctionCall;
    ChatToolCall {
        id: pending.call.call_id.clone(),
        call_type: "function".to_string(),
        function: ChatFunctionCall {
            name: pending.call.tool_name.clone(),
            arguments: pending.call.arguments_json.clone(),
        },
    }
}

fn pending_to_responses_tool_call(pending: &PendingApproval) -> ResponsesToolCall {
    ResponsesToolCall {
        call_id: pending.call.call_id.clone(),
        name: pending.call.tool_name.clone(),
        arguments: pending.call.arguments_json.clone(),
    }
}

/// Builds a [`Gateway`] from a declarative client list (spec.md §3's Client
/// Config), connecting every client and registering `bifrostInternal`
/// automatically.
pub struct GatewayBuilder {
    configs: Vec<ClientConfig>,
    plugins: PluginPipeline,
    sandbox_budget: SandboxBudget,
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self {
            configs: Vec::new(),
            plugins: PluginPipeline::new(),
            sandbox_budget: SandboxBudget::default(),
        }
    }
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(mut self, config: ClientConfig) -> Self {
        self.configs.push(config);
        self
    }

    pub fn with_clients(mut self, configs: impl IntoIterator<Item = ClientConfig>) -> Self {
        self.configs.extend(configs);
        self
    }

    pub fn with_plugins(mut self, plugins: PluginPipeline) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn with_sandbox_budget(mut self, budget: SandboxBudget) -> Self {
        self.sandbox_budget = budget;
        self
    }

    /// Connects every configured client (failing fast on the first one that
    /// cannot connect) and returns the assembled [`Gateway`].
    pub async fn build(self) -> Result<Gateway, GatewayError> {
        let manager = Arc::new(Manager::new());
        let any_code_mode = self.configs.iter().any(|c| c.is_code_mode_client);

        for config in self.configs {
            manager.add_client(config).await?;
        }

        let sandbox = if any_code_mode {
            Some(Arc::new(CodeSandbox::new(Arc::clone(&manager), self.sandbox_budget)))
        } else {
            None
        };

        register_builtin_client(Arc::clone(&manager), sandbox.clone()).await?;

        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&manager), self.plugins));

        Ok(Gateway {
            manager,
            dispatcher,
            sandbox,
        })
    }
}

/// Registers an already-connected [`Client`] directly, bypassing
/// [`GatewayBuilder`]'s declarative config path. Used by hosts that build a
/// client with a custom transport (tests, or an embedder with its own
/// connection logic) rather than one of [`crate::config::TransportConfig`]'s
/// variants.
pub async fn register_connected_client(manager: &Arc<Manager>, client: Client) -> Result<(), GatewayError> {
    manager.add_connected_client(client).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionType, ToolFilter, TransportConfig};

    #[tokio::test]
    async fn builder_registers_bifrost_internal_even_with_no_clients() {
        let gateway = GatewayBuilder::new().build().await.unwrap();
        let ctx = RequestContext::new();
        let tools = gateway.manager().get_tools_per_client(&ctx).await;
        assert!(tools.contains_key("bifrostInternal"));
    }

    #[tokio::test]
    async fn execute_chat_mcp_tool_runs_a_builtin_tool() {
        let gateway = GatewayBuilder::new().build().await.unwrap();
        let ctx = RequestContext::new();
        let message = gateway
            .execute_chat_mcp_tool(
                &ctx,
                ChatToolCall {
                    id: "call-1".into(),
                    call_type: "function".into(),
                    function: crate::adapter::chat::ChatFunctionCall {
                        name: "bifrostInternal-echo".into(),
                        arguments: "{\"text\":\"hi\"}".into(),
                    },
                },
            )
            .await;
        assert_eq!(message.tool_call_id.as_deref(), Some("call-1"));
        assert_eq!(message.content.as_deref(), Some("hi"));
    }

    fn code_mode_client_config(name: &str) -> ClientConfig {
        ClientConfig {
            id: name.to_string(),
            name: name.to_string(),
            connection_type: ConnectionType::InProcess,
            transport: TransportConfig::InProcess,
            tools_to_execute: ToolFilter::All,
            tools_to_auto_execute: ToolFilter::All,
            is_code_mode_client: true,
            call_timeout_secs: None,
        }
    }

    #[tokio::test]
    async fn builder_only_builds_a_sandbox_when_a_client_opts_in() {
        let gateway = GatewayBuilder::new().build().await.unwrap();
        assert!(gateway.sandbox().is_none());

        // in-process transports need a handler table; this just checks the
        // sandbox-construction branch, not a real connection, so we can't
        // easily add a connecting code-mode client here without a transport.
        // Covered end-to-end in `sandbox` module tests instead.
        let _ = code_mode_client_config("demo");
    }
}
