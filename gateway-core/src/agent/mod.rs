//! Agent orchestrator (C6, spec.md §5): classifies LLM-requested tool calls
//! as auto-executable or approval-gated, fans out auto-executable calls in
//! parallel with ordered results, and loops until the model stops
//! requesting tools or `maxDepth` is reached.

mod orchestrator;
mod types;

pub use orchestrator::AgentOrchestrator;
pub use types::{
    ConversationTurn, ExecutionClass, LlmInvoker, LlmTurn, PendingApproval, StepOutcome, TurnRole,
};

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::client::Client;
    use crate::config::{ClientConfig, ConnectionType, ToolFilter, TransportConfig};
    use crate::context::RequestContext;
    use crate::dispatcher::Dispatcher;
    use crate::error::GatewayError;
    use crate::manager::Manager;
    use crate::message::ToolCall;
    use crate::plugin::PluginPipeline;
    use crate::transport::InProcessTransport;

    async fn manager_with_auto_and_approval_tools() -> Manager {
        let manager = Manager::new();
        let config = ClientConfig {
            id: "c1".into(),
            name: "demo".into(),
            connection_type: ConnectionType::InProcess,
            transport: TransportConfig::InProcess,
            tools_to_execute: ToolFilter::named(["safe", "risky"]),
            tools_to_auto_execute: ToolFilter::named(["safe"]),
            is_code_mode_client: false,
            call_timeout_secs: None,
        };
        let transport = InProcessTransport::builder()
            .method("tools/list", |_| async {
                Ok(json!({"tools": [{"name": "safe"}, {"name": "risky"}]}))
            })
            .method("tools/call", |params| async move {
                let name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!({"content": [{"type": "text", "text": format!("ran {name}")}]}))
            })
            .build();
        let client = Client::with_in_process_transport(config, transport).await.unwrap();
        manager.add_connected_client(client).await.unwrap();
        manager
    }

    struct ScriptedLlm {
        turns: Mutex<Vec<LlmTurn>>,
    }

    #[async_trait]
    impl LlmInvoker for ScriptedLlm {
        async fn invoke(&self, _history: &[ConversationTurn]) -> Result<LlmTurn, GatewayError> {
            let mut turns = self.turns.lock().unwrap();
            if turns.is_empty() {
                return Ok(LlmTurn::default());
            }
            Ok(turns.remove(0))
        }
    }

    #[tokio::test]
    async fn auto_executable_tool_runs_without_approval() {
        let manager = Arc::new(manager_with_auto_and_approval_tools().await);
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&manager), PluginPipeline::new()));
        let llm = Arc::new(ScriptedLlm {
            turns: Mutex::new(vec![
                LlmTurn {
                    content: String::new(),
                    tool_calls: vec![ToolCall {
                        call_id: "1".into(),
                        tool_name: "demo-safe".into(),
                        arguments_json: "{}".into(),
                    }],
                    usage: None,
                },
                LlmTurn {
                    content: "done".into(),
                    tool_calls: vec![],
                    usage: None,
                },
            ]),
        });
        let orchestrator = AgentOrchestrator::new(manager, dispatcher, llm, 5);
        let outcome = orchestrator.run(&RequestContext::new(), vec![]).await.unwrap();
        match outcome {
            StepOutcome::Finished(history) => {
                assert!(history.iter().any(|t| t.tool_results.iter().any(|r| r.content.contains("ran safe"))));
            }
            _ => panic!("expected Finished"),
        }
    }

    #[tokio::test]
    async fn approval_gated_tool_stops_the_loop() {
        let manager = Arc::new(manager_with_auto_and_approval_tools().await);
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&manager), PluginPipeline::new()));
        let llm = Arc::new(ScriptedLlm {
            turns: Mutex::new(vec![LlmTurn {
                content: String::new(),
                tool_calls: vec![ToolCall {
                    call_id: "1".into(),
                    tool_name: "demo-risky".into(),
                    arguments_json: "{}".into(),
                }],
                usage: None,
            }]),
        });
        let orchestrator = AgentOrchestrator::new(manager, dispatcher, llm, 5);
        let outcome = orchestrator.run(&RequestContext::new(), vec![]).await.unwrap();
        match outcome {
            StepOutcome::NeedsApproval { pending, .. } => {
                assert_eq!(pending.len(), 1);
                assert_eq!(pending[0].call.tool_name, "demo-risky");
            }
            _ => panic!("expected NeedsApproval"),
        }
    }

    #[tokio::test]
    async fn depth_exceeded_when_model_never_stops_requesting_tools() {
        let manager = Arc::new(manager_with_auto_and_approval_tools().await);
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&manager), PluginPipeline::new()));
        let always_calls_safe = LlmTurn {
            content: String::new(),
            tool_calls: vec![ToolCall {
                call_id: "1".into(),
                tool_name: "demo-safe".into(),
                arguments_json: "{}".into(),
            }],
            usage: None,
        };
        let llm = Arc::new(ScriptedLlm {
            turns: Mutex::new(vec![always_calls_safe.clone(), always_calls_safe.clone(), always_calls_safe]),
        });
        let orchestrator = AgentOrchestrator::new(manager, dispatcher, llm, 3);
        let outcome = orchestrator.run(&RequestContext::new(), vec![]).await.unwrap();
        assert!(matches!(outcome, StepOutcome::DepthExceeded(_)));
    }
}
