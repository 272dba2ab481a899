//! Client: one connected MCP provider (C2, spec.md §3).
//!
//! Owns a [`Transport`], the most recent `tools/list` catalog, and the
//! client's lifecycle state. `tool_map` is an [`IndexMap`] rather than a
//! `HashMap` so tool order is stable across `tools/list` calls, matching
//! the order the server itself declared them in — callers that surface
//! tool catalogs to an LLM prompt should not see them reshuffle on every
//! refresh.

use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::config::{qualify, ClientConfig, ConnectionType, TransportConfig};
use crate::error::GatewayError;
use crate::transport::{HttpTransport, InProcessTransport, StdioTransport, Transport};

/// Lifecycle state of a [`Client`] (spec.md §3/§4.2).
///
/// Collapses the five-state diagram in spec.md §4.2 to four observable
/// members: `disconnecting` is folded into `shutdown`/`reconnect`'s
/// synchronous teardown rather than given its own member, since those
/// methods await the transport drain to completion before ever writing
/// `state`, so no reader can observe a client that is mid-teardown. `Ready`
/// stands for the diagram's `connected`, `Failed` for `error`, `Closed` for
/// `disconnected`. Invariant (iii) — a client not `connected` rejects
/// dispatch — holds: only `Ready` is treated as callable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientState {
    /// Transport connected and `initialize` complete, but `tools/list` not
    /// yet fetched.
    Connecting,
    /// Connected and holding a tool catalog. Spec.md's `connected`.
    Ready,
    /// The transport reported a failure; `reconnect` is needed before the
    /// client can serve calls again. Spec.md's `error`.
    Failed,
    /// `shutdown` was called; the client will not reconnect on its own.
    /// Spec.md's `disconnected`.
    Closed,
}

/// One tool's specification, as advertised by `tools/list`.
#[derive(Clone, Debug)]
pub struct ToolSpec {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

/// A connected MCP provider: transport, tool catalog, and lifecycle state
/// (spec.md §3's "Client" entity).
pub struct Client {
    config: RwLock<ClientConfig>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    /// Unqualified tool name -> spec, in `tools/list` order.
    tool_map: RwLock<IndexMap<String, ToolSpec>>,
    state: RwLock<ClientState>,
}

impl Client {
    /// Builds a client in [`ClientState::Connecting`] without opening a
    /// transport; callers connect it explicitly via [`Client::connect`].
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config: RwLock::new(config),
            transport: RwLock::new(None),
            tool_map: RwLock::new(IndexMap::new()),
            state: RwLock::new(ClientState::Connecting),
        }
    }

    pub async fn id(&self) -> String {
        self.config.read().await.id.clone()
    }

    pub async fn name(&self) -> String {
        self.config.read().await.name.clone()
    }

    pub async fn state(&self) -> ClientState {
        *self.state.read().await
    }

    pub async fn config(&self) -> ClientConfig {
        self.config.read().await.clone()
    }

    /// Opens the transport described by this client's config and fetches
    /// the initial tool catalog. Transitions `Connecting` -> `Ready`, or
    /// `Connecting` -> `Failed` on error.
    #[instrument(skip(self), fields(client = %self.config.read().await.name))]
    pub async fn connect(&self) -> Result<(), GatewayError> {
        let config = self.config.read().await.clone();
        match self.open_transport(&config).await {
            Ok(transport) => {
                *self.transport.write().await = Some(transport);
            }
            Err(e) => {
                *self.state.write().await = ClientState::Failed;
                return Err(e);
            }
        }
        match self.refresh_tools().await {
            Ok(()) => {
                *self.state.write().await = ClientState::Ready;
                info!(client = %config.name, "client ready");
                Ok(())
            }
            Err(e) => {
                *self.state.write().await = ClientState::Failed;
                Err(e)
            }
        }
    }

    async fn open_transport(
        &self,
        config: &ClientConfig,
    ) -> Result<Arc<dyn Transport>, GatewayError> {
        let transport: Arc<dyn Transport> = match &config.transport {
            TransportConfig::Stdio { command, args, env } => Arc::new(
                StdioTransport::spawn(command, args, env)
                    .await
                    .map_err(|e| GatewayError::Transport(e.to_string()))?,
            ),
            TransportConfig::Http { url, headers } => match config.connection_type {
                ConnectionType::Sse => Arc::new(
                    HttpTransport::connect_sse(url, headers)
                        .await
                        .map_err(|e| GatewayError::Transport(e.to_string()))?,
                ),
                _ => Arc::new(
                    HttpTransport::connect(url, headers)
                        .await
                        .map_err(|e| GatewayError::Transport(e.to_string()))?,
                ),
            },
            TransportConfig::InProcess => {
                return Err(GatewayError::Validation(format!(
                    "client {:?}: in-process clients must be connected via Client::with_in_process_transport",
                    config.name
                )));
            }
        };
        Ok(transport)
    }

    /// Builds a client already bound to an [`InProcessTransport`] (used for
    /// `bifrostInternal`, spec.md §6), skipping `open_transport`'s match arm
    /// that otherwise rejects `TransportConfig::InProcess`.
    pub async fn with_in_process_transport(
        config: ClientConfig,
        transport: InProcessTransport,
    ) -> Result<Self, GatewayError> {
        let client = Self::new(config);
        *client.transport.write().await = Some(Arc::new(transport));
        client.refresh_tools().await?;
        *client.state.write().await = ClientState::Ready;
        Ok(client)
    }

    /// Re-fetches `tools/list` and replaces the catalog.
    pub async fn refresh_tools(&self) -> Result<(), GatewayError> {
        let transport = self.transport_handle().await?;
        let result = transport
            .call("tools/list", Value::Object(Default::default()), None)
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let tools = result
            .get("tools")
            .and_then(|v| v.as_array())
            .ok_or_else(|| GatewayError::Transport("tools/list: missing tools array".into()))?;

        let mut map = IndexMap::with_capacity(tools.len());
        for tool in tools {
            let name = tool
                .get("name")
                .and_then(|v| v.as_str())
                .ok_or_else(|| GatewayError::Transport("tools/list: tool missing name".into()))?
                .to_string();
            let description = tool
                .get("description")
                .and_then(|v| v.as_str())
                .map(String::from);
            let input_schema = tool
                .get("inputSchema")
                .cloned()
                .unwrap_or(Value::Object(Default::default()));
            map.insert(
                name.clone(),
                ToolSpec {
                    name,
                    description,
                    input_schema,
                },
            );
        }
        *self.tool_map.write().await = map;
        Ok(())
    }

    /// Returns the qualified tool catalog (`<clientName>-<toolName>` ->
    /// spec), in `tools/list` order.
    pub async fn qualified_tools(&self) -> IndexMap<String, ToolSpec> {
        let name = self.name().await;
        self.tool_map
            .read()
            .await
            .iter()
            .map(|(tool_name, spec)| (qualify(&name, tool_name), spec.clone()))
            .collect()
    }

    pub async fn has_tool(&self, unqualified_tool_name: &str) -> bool {
        self.tool_map.read().await.contains_key(unqualified_tool_name)
    }

    /// Invokes `tools/call` for `unqualified_tool_name` with the given
    /// arguments, honouring `deadline` if set.
    pub async fn call_tool(
        &self,
        unqualified_tool_name: &str,
        arguments: Value,
        deadline: Option<Instant>,
    ) -> Result<Value, GatewayError> {
        let transport = self.transport_handle().await?;
        let params = serde_json::json!({
            "name": unqualified_tool_name,
            "arguments": arguments,
        });
        transport
            .call("tools/call", params, deadline)
            .await
            .map_err(|e| {
                warn!(tool = unqualified_tool_name, error = %e, "tool call failed");
                GatewayError::Transport(e.to_string())
            })
    }

    /// Replaces this client's config in place (spec.md §3's config update
    /// operation). Takes effect on the next `connect`/`reconnect`.
    pub async fn update_config(&self, config: ClientConfig) -> Result<(), GatewayError> {
        config.validate()?;
        *self.config.write().await = config;
        Ok(())
    }

    /// Tears down and re-opens the transport, then refreshes the tool
    /// catalog.
    pub async fn reconnect(&self) -> Result<(), GatewayError> {
        self.shutdown_transport().await;
        self.connect().await
    }

    /// Tears down the transport and marks the client `Closed`.
    pub async fn shutdown(&self) {
        self.shutdown_transport().await;
        *self.state.write().await = ClientState::Closed;
    }

    async fn shutdown_transport(&self) {
        if let Some(transport) = self.transport.write().await.take() {
            transport.shutdown().await;
        }
    }

    async fn transport_handle(&self) -> Result<Arc<dyn Transport>, GatewayError> {
        self.transport
            .read()
            .await
            .clone()
            .ok_or_else(|| GatewayError::Transport("client has no open transport".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionType, ToolFilter, TransportConfig};
    use crate::transport::InProcessTransport;

    fn test_config(name: &str) -> ClientConfig {
        ClientConfig {
            id: name.to_string(),
            name: name.to_string(),
            connection_type: ConnectionType::InProcess,
            transport: TransportConfig::InProcess,
            tools_to_execute: ToolFilter::All,
            tools_to_auto_execute: ToolFilter::All,
            is_code_mode_client: false,
            call_timeout_secs: None,
        }
    }

    #[tokio::test]
    async fn connect_populates_tool_catalog_in_order() {
        let transport = InProcessTransport::builder()
            .method("tools/list", |_| async {
                Ok(serde_json::json!({
                    "tools": [
                        {"name": "b_tool", "description": "second"},
                        {"name": "a_tool", "description": "first"}
                    ]
                }))
            })
            .build();

        let client = Client::with_in_process_transport(test_config("demo"), transport)
            .await
            .unwrap();
        assert_eq!(client.state().await, ClientState::Ready);

        let tools = client.qualified_tools().await;
        let names: Vec<&String> = tools.keys().collect();
        assert_eq!(names, vec!["demo-b_tool", "demo-a_tool"]);
    }

    #[tokio::test]
    async fn call_tool_invokes_transport_with_unqualified_name() {
        let transport = InProcessTransport::builder()
            .method("tools/list", |_| async { Ok(serde_json::json!({"tools": []})) })
            .method("tools/call", |params| async move {
                let name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
                Ok(serde_json::json!({ "echo": name }))
            })
            .build();

        let client = Client::with_in_process_transport(test_config("demo"), transport)
            .await
            .unwrap();
        let result = client
            .call_tool("echo", serde_json::json!({}), None)
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!({"echo": "echo"}));
    }
}
