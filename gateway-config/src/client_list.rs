//! Declarative Client Config list (spec.md §3) loaded from TOML — the
//! gateway analogue of the teacher's `mcp.json` server discovery file.
//!
//! A gateway operator lists the MCP servers they want connected, their
//! transports, and their tool filters in one file rather than wiring each
//! [`gateway_core::config::ClientConfig`] up in code.

use std::path::Path;

use gateway_core::config::ClientConfig;
use serde::Deserialize;

use crate::LoadError;

/// Top-level shape of a gateway client-list TOML file:
///
/// ```toml
/// [[client]]
/// id = "weather"
/// name = "weather"
/// connection_type = "stdio"
/// tools_to_execute = ["*"]
/// tools_to_auto_execute = ["get_forecast"]
///
/// [client.transport]
/// command = "weather-mcp-server"
/// args = []
/// ```
#[derive(Deserialize, Default)]
struct ClientListFile {
    #[serde(default, rename = "client")]
    clients: Vec<ClientConfig>,
}

/// Reads and validates the client list at `path`. Every entry is run
/// through [`ClientConfig::validate`] so a malformed identifier or a
/// transport/connection_type mismatch is caught at load time rather than
/// on first connect.
pub fn load_gateway_config(path: &Path) -> Result<Vec<ClientConfig>, LoadError> {
    let content = std::fs::read_to_string(path).map_err(LoadError::ClientListRead)?;
    let file: ClientListFile = toml::from_str(&content)?;
    for client in &file.clients {
        client.validate().map_err(|e| LoadError::ClientListInvalid(e.to_string()))?;
    }
    Ok(file.clients)
}
