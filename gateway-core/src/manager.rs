//! Manager: registry of [`Client`]s and qualified-name resolution (C3,
//! spec.md §3).
//!
//! Qualified tool names (`<clientName>-<toolName>`) are resolved to a
//! specific client by splitting on the first `-`; the manager then checks
//! that client's `toolsToExecute` filter before handing the call to
//! [`crate::dispatcher::Dispatcher`].

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::RwLock;
use tracing::{info, instrument};

use crate::client::{Client, ClientState, ToolSpec};
use crate::config::{unqualify, ClientConfig};
use crate::context::RequestContext;
use crate::error::GatewayError;
use crate::message::{ToolCall, ToolResult};

/// Owns every configured [`Client`] and resolves qualified tool names to
/// the client that serves them.
#[derive(Default)]
pub struct Manager {
    /// Keyed by `ClientConfig::id`, the stable handle (spec.md §3).
    clients: RwLock<HashMap<String, Arc<Client>>>,
    /// `ClientConfig::name` -> id, since qualified tool names and context
    /// filters address clients by name, not id.
    name_index: RwLock<HashMap<String, String>>,
}

impl Manager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers and connects a new client. Fails if a client with the same
    /// `name` already exists (names must be unique: they are the left half
    /// of every qualified tool name for this client).
    #[instrument(skip(self, config), fields(client = %config.name))]
    pub async fn add_client(&self, config: ClientConfig) -> Result<(), GatewayError> {
        config.validate()?;
        {
            let names = self.name_index.read().await;
            if names.contains_key(&config.name) {
                return Err(GatewayError::Validation(format!(
                    "client name {:?} already registered",
                    config.name
                )));
            }
        }
        let id = config.id.clone();
        let name = config.name.clone();
        let client = Arc::new(Client::new(config));
        client.connect().await?;

        self.clients.write().await.insert(id.clone(), client);
        self.name_index.write().await.insert(name.clone(), id);
        info!(client = %name, "client registered");
        Ok(())
    }

    /// Registers a client that is already connected (used for
    /// `bifrostInternal`, which binds an in-process transport rather than
    /// going through [`Manager::add_client`]'s generic `connect` path).
    pub async fn add_connected_client(&self, client: Client) -> Result<(), GatewayError> {
        let config = client.config().await;
        {
            let names = self.name_index.read().await;
            if names.contains_key(&config.name) {
                return Err(GatewayError::Validation(format!(
                    "client name {:?} already registered",
                    config.name
                )));
            }
        }
        let id = config.id.clone();
        let name = config.name.clone();
        self.clients.write().await.insert(id.clone(), Arc::new(client));
        self.name_index.write().await.insert(name, id);
        Ok(())
    }

    /// Disconnects and removes a client by name.
    pub async fn remove_client(&self, client_name: &str) -> Result<(), GatewayError> {
        let id = self.resolve_id(client_name).await?;
        if let Some(client) = self.clients.write().await.remove(&id) {
            client.shutdown().await;
        }
        self.name_index.write().await.remove(client_name);
        Ok(())
    }

    /// Replaces a client's config and reconnects it.
    pub async fn update_client(
        &self,
        client_name: &str,
        config: ClientConfig,
    ) -> Result<(), GatewayError> {
        let client = self.get_by_name(client_name).await?;
        client.update_config(config).await?;
        client.reconnect().await
    }

    pub async fn reconnect_client(&self, client_name: &str) -> Result<(), GatewayError> {
        let client = self.get_by_name(client_name).await?;
        client.reconnect().await
    }

    /// Returns a deep copy of every registered client's config, for
    /// admin/inspection endpoints (spec.md §3's "get clients" operation).
    pub async fn get_clients(&self) -> Vec<ClientConfig> {
        let clients = self.clients.read().await;
        let mut configs = Vec::with_capacity(clients.len());
        for client in clients.values() {
            configs.push(client.config().await);
        }
        configs
    }

    pub async fn get_client_state(&self, client_name: &str) -> Result<ClientState, GatewayError> {
        Ok(self.get_by_name(client_name).await?.state().await)
    }

    /// Returns every qualified tool visible under `ctx`'s client/tool
    /// filters, grouped by client name in registration order within each
    /// client's own `tools/list` order.
    pub async fn get_tools_per_client(
        &self,
        ctx: &RequestContext,
    ) -> IndexMap<String, IndexMap<String, ToolSpec>> {
        let clients = self.clients.read().await;
        let mut out = IndexMap::new();
        for client in clients.values() {
            let name = client.name().await;
            if !ctx.allows_client(&name) || client.state().await != ClientState::Ready {
                continue;
            }
            let qualified = client.qualified_tools().await;
            let filtered: IndexMap<String, ToolSpec> = qualified
                .into_iter()
                .filter(|(qualified_name, _)| ctx.allows_tool(qualified_name))
                .collect();
            if !filtered.is_empty() {
                out.insert(name, filtered);
            }
        }
        out
    }

    /// Resolves a qualified tool name to its client and confirms the tool is
    /// within that client's `toolsToExecute` filter, without yet executing it
    /// (used by [`crate::dispatcher::Dispatcher`] before running the plugin
    /// pipeline).
    pub async fn resolve_tool(&self, qualified_tool_name: &str) -> Result<Arc<Client>, GatewayError> {
        let (client_name, tool_name) = unqualify(qualified_tool_name).ok_or_else(|| {
            GatewayError::Validation(format!(
                "{qualified_tool_name:?} is not a qualified tool name"
            ))
        })?;
        let client = self.get_by_name(client_name).await?;
        let config = client.config().await;
        if !config.tools_to_execute.allows(tool_name) {
            return Err(GatewayError::Permission(format!(
                "tool {tool_name:?} is not permitted for client {client_name:?}"
            )));
        }
        if client.state().await != ClientState::Ready {
            return Err(GatewayError::Transport(format!(
                "client {client_name:?} is not ready"
            )));
        }
        Ok(client)
    }

    /// True when `qualified_tool_name` is within its client's
    /// `toolsToAutoExecute` filter (spec.md §5.2's auto vs. approval
    /// classification). Does not check `toolsToExecute`; callers that need
    /// to know whether the tool is callable at all should also consult
    /// [`Manager::resolve_tool`].
    pub async fn is_auto_executable(&self, qualified_tool_name: &str) -> Result<bool, GatewayError> {
        let (client_name, tool_name) = unqualify(qualified_tool_name).ok_or_else(|| {
            GatewayError::Validation(format!(
                "{qualified_tool_name:?} is not a qualified tool name"
            ))
        })?;
        let client = self.get_by_name(client_name).await?;
        let config = client.config().await;
        Ok(config.tools_to_auto_execute.allows(tool_name))
    }

    /// Executes one qualified tool call end to end: resolve, permission
    /// check, invoke. Always returns a [`ToolResult`]; recoverable errors are
    /// folded into `is_error = true` rather than propagated, per spec.md §7.
    pub async fn execute_tool_call(
        &self,
        ctx: &RequestContext,
        call: ToolCall,
    ) -> ToolResult {
        if !ctx.allows_tool(&call.tool_name) {
            return GatewayError::Permission(format!(
                "tool {:?} excluded by request context",
                call.tool_name
            ))
            .to_tool_result(call.call_id);
        }

        if let Some((client_name, _)) = unqualify(&call.tool_name) {
            if !ctx.allows_client(client_name) {
                return GatewayError::Permission(format!(
                    "client {client_name:?} excluded by request context"
                ))
                .to_tool_result(call.call_id);
            }
        }

        let client = match self.resolve_tool(&call.tool_name).await {
            Ok(c) => c,
            Err(e) => return e.to_tool_result(call.call_id),
        };

        let (_, unqualified_name) = match unqualify(&call.tool_name) {
            Some(pair) => pair,
            None => {
                return GatewayError::Validation(format!(
                    "{:?} is not a qualified tool name",
                    call.tool_name
                ))
                .to_tool_result(call.call_id)
            }
        };

        let arguments: serde_json::Value = match serde_json::from_str(&call.arguments_json) {
            Ok(v) => v,
            Err(e) => {
                return GatewayError::Validation(format!("invalid arguments JSON: {e}"))
                    .to_tool_result(call.call_id)
            }
        };

        match client.call_tool(unqualified_name, arguments, ctx.deadline()).await {
            Ok(value) => {
                let is_error = value.get("isError").and_then(|v| v.as_bool()).unwrap_or(false);
                ToolResult {
                    call_id: call.call_id,
                    content: render_tool_value(&value),
                    is_error,
                }
            }
            Err(e) => e.to_tool_result(call.call_id),
        }
    }

    async fn resolve_id(&self, client_name: &str) -> Result<String, GatewayError> {
        self.name_index
            .read()
            .await
            .get(client_name)
            .cloned()
            .ok_or_else(|| GatewayError::Validation(format!("no such client: {client_name:?}")))
    }

    async fn get_by_name(&self, client_name: &str) -> Result<Arc<Client>, GatewayError> {
        let id = self.resolve_id(client_name).await?;
        self.clients
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| GatewayError::Validation(format!("no such client: {client_name:?}")))
    }
}

/// Extracts the `content` text blocks of a `tools/call` result the way
/// [`crate::client`]'s callers expect a flat string, falling back to
/// `structuredContent` then the raw JSON (mirrors the teacher's MCP result
/// parsing in spirit, generalized to not assume a fixed error convention).
fn render_tool_value(value: &serde_json::Value) -> String {
    if let Some(blocks) = value.get("content").and_then(|c| c.as_array()) {
        let text: Vec<&str> = blocks
            .iter()
            .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
            .collect();
        if !text.is_empty() {
            return text.join("\n");
        }
    }
    if let Some(structured) = value.get("structuredContent") {
        return structured.to_string();
    }
    value.to_string()
}
