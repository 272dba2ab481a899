//! Dispatcher: validate, filter, run the plugin pipeline, execute, enforce
//! the timeout (C4, spec.md §4.2).
//!
//! `dispatch` always returns a [`ToolResult`]: recoverable failures
//! (validation, permission, transport, timeout) are folded into
//! `is_error = true` so the caller — the agent orchestrator, or a host
//! calling the gateway directly — never has to special-case "the tool
//! failed" versus "the tool ran and said something went wrong".

use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;

use crate::context::RequestContext;
use crate::error::GatewayError;
use crate::manager::Manager;
use crate::message::{ToolCall, ToolResult};
use crate::plugin::{PluginPipeline, PreOutcome};

/// Default per-call timeout when neither the request context nor the
/// client config set one (spec.md §4.2).
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Dispatcher {
    manager: Arc<Manager>,
    plugins: PluginPipeline,
}

impl Dispatcher {
    pub fn new(manager: Arc<Manager>, plugins: PluginPipeline) -> Self {
        Self { manager, plugins }
    }

    /// Runs one tool call through validate -> plugin pre-hooks -> execute
    /// -> plugin post-hooks, honouring the request context's deadline.
    #[instrument(skip(self, call), fields(tool = %call.tool_name))]
    pub async fn dispatch(&self, ctx: &RequestContext, call: ToolCall) -> ToolResult {
        if ctx.is_cancelled() {
            let result = GatewayError::Timeout("request cancelled".into())
                .to_tool_result(call.call_id.clone());
            return self.plugins.run_post(ctx, result).await;
        }

        if let Err(e) = validate_call(&call) {
            let result = e.to_tool_result(call.call_id.clone());
            return self.plugins.run_post(ctx, result).await;
        }

        let outcome = self.plugins.run_pre(ctx, call).await;
        let result = match outcome {
            PreOutcome::ShortCircuit(result) => result,
            PreOutcome::Continue(call) => self.execute(ctx, call).await,
        };
        self.plugins.run_post(ctx, result).await
    }

    /// Runs `calls` concurrently through the same validate -> pre-hooks ->
    /// execute -> post-hooks path as [`Dispatcher::dispatch`], and returns
    /// their results in the same order as `calls`, regardless of completion
    /// order (spec.md §5.2's fan-out requirement). `join_all` polls every
    /// call's future concurrently but hands back results in input order, so
    /// no separate index bookkeeping is needed here.
    pub async fn dispatch_many(&self, ctx: &RequestContext, calls: Vec<ToolCall>) -> Vec<ToolResult> {
        let futures = calls.into_iter().map(|call| self.dispatch(ctx, call));
        futures::future::join_all(futures).await
    }

    async fn execute(&self, ctx: &RequestContext, call: ToolCall) -> ToolResult {
        let deadline = ctx.deadline().unwrap_or_else(|| {
            std::time::Instant::now() + DEFAULT_CALL_TIMEOUT
        });
        let bounded_ctx = ctx.clone().with_deadline(deadline);
        self.manager.execute_tool_call(&bounded_ctx, call).await
    }
}

fn validate_call(call: &ToolCall) -> Result<(), GatewayError> {
    if call.tool_name.trim().is_empty() {
        return Err(GatewayError::Validation("tool_name is empty".into()));
    }
    if serde_json::from_str::<serde_json::Value>(&call.arguments_json).is_err() {
        return Err(GatewayError::Validation(format!(
            "arguments for {:?} are not valid JSON",
            call.tool_name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClientConfig, ConnectionType, ToolFilter, TransportConfig};
    use crate::transport::InProcessTransport;

    async fn dispatcher_with_echo() -> Dispatcher {
        let manager = Arc::new(Manager::new());
        let config = ClientConfig {
            id: "c1".into(),
            name: "demo".into(),
            connection_type: ConnectionType::InProcess,
            transport: TransportConfig::InProcess,
            tools_to_execute: ToolFilter::All,
            tools_to_auto_execute: ToolFilter::All,
            is_code_mode_client: false,
            call_timeout_secs: None,
        };
        let transport = InProcessTransport::builder()
            .method("tools/list", |_| async {
                Ok(serde_json::json!({"tools": [{"name": "echo"}]}))
            })
            .method("tools/call", |params| async move {
                Ok(serde_json::json!({
                    "content": [{"type": "text", "text": params.get("arguments").unwrap().to_string()}]
                }))
            })
            .build();
        let client = crate::client::Client::with_in_process_transport(config, transport)
            .await
            .unwrap();
        manager.add_connected_client(client).await.unwrap();
        Dispatcher::new(manager, PluginPipeline::new())
    }

    #[tokio::test]
    async fn dispatch_rejects_malformed_arguments_without_panicking() {
        let dispatcher = dispatcher_with_echo().await;
        let result = dispatcher
            .dispatch(
                &RequestContext::new(),
                ToolCall {
                    call_id: "1".into(),
                    tool_name: "demo-echo".into(),
                    arguments_json: "not json".into(),
                },
            )
            .await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn dispatch_many_preserves_call_order_regardless_of_completion_order() {
        let dispatcher = dispatcher_with_echo().await;
        let calls = (0..5)
            .map(|i| ToolCall {
                call_id: i.to_string(),
                tool_name: "demo-echo".into(),
                arguments_json: format!("{{\"n\":{i}}}"),
            })
            .collect();
        let results = dispatcher.dispatch_many(&RequestContext::new(), calls).await;
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.call_id, i.to_string());
            assert!(result.content.contains(&format!("\"n\":{i}")));
        }
    }
}
