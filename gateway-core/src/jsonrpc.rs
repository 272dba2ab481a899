//! Minimal JSON-RPC 2.0 wire types for the MCP transports (spec.md §6).
//!
//! Self-contained rather than pulled from an external SDK: the gateway only
//! ever speaks three methods (`initialize`, `tools/list`, `tools/call`), so a
//! small `serde_json`-backed wrapper is clearer than a general-purpose
//! JSON-RPC crate's full surface.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC request id: either a string or an integer, per the spec.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RpcId {
    Number(i64),
    String(String),
}

impl std::fmt::Display for RpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcId::Number(n) => write!(f, "{n}"),
            RpcId::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<String> for RpcId {
    fn from(s: String) -> Self {
        RpcId::String(s)
    }
}

impl From<&str> for RpcId {
    fn from(s: &str) -> Self {
        RpcId::String(s.to_string())
    }
}

impl From<i64> for RpcId {
    fn from(n: i64) -> Self {
        RpcId::Number(n)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: RpcId,
    pub method: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: impl Into<RpcId>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl RpcNotification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A response frame, as received on the wire. `result` and `error` are
/// mutually exclusive per JSON-RPC 2.0; we keep both `Option` rather than an
/// enum so deserialization tolerates servers that send `"result": null` on
/// success.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: RpcId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Converts this response into `Ok(result)` / `Err(message)`, treating a
    /// response with neither `result` nor `error` as an empty success.
    pub fn into_result(self) -> Result<Value, String> {
        if let Some(err) = self.error {
            Err(err.message)
        } else {
            Ok(self.result.unwrap_or(Value::Null))
        }
    }
}

/// One inbound frame from a server: either a response to a request we sent,
/// an unsolicited notification, or a server-initiated request (e.g.
/// `roots/list`) that we must answer.
#[derive(Clone, Debug)]
pub enum InboundFrame {
    Response(RpcResponse),
    Notification { method: String, params: Value },
    ServerRequest { id: RpcId, method: String, params: Value },
}

/// Parses one line of newline-delimited JSON into an [`InboundFrame`].
pub fn parse_inbound(line: &str) -> Result<InboundFrame, serde_json::Error> {
    let value: Value = serde_json::from_str(line)?;
    let obj = value.as_object();
    let has_id = obj.map(|o| o.contains_key("id")).unwrap_or(false);
    let has_method = obj.map(|o| o.contains_key("method")).unwrap_or(false);

    if has_id && !has_method {
        let response: RpcResponse = serde_json::from_value(value)?;
        return Ok(InboundFrame::Response(response));
    }
    let method = obj
        .and_then(|o| o.get("method"))
        .and_then(|m| m.as_str())
        .unwrap_or_default()
        .to_string();
    let params = obj
        .and_then(|o| o.get("params"))
        .cloned()
        .unwrap_or(Value::Null);
    if has_id {
        let id: RpcId = serde_json::from_value(obj.unwrap().get("id").cloned().unwrap())?;
        Ok(InboundFrame::ServerRequest { id, method, params })
    } else {
        Ok(InboundFrame::Notification { method, params })
    }
}
