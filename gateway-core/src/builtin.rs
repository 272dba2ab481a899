//! `bifrostInternal`: the reserved in-process client exposing the gateway's
//! own built-in tools (spec.md §6) — echo, calculator, a weather mock for
//! exercising the approval-gated path in tests, and the code-mode sandbox's
//! `executeToolCode` / `listToolFiles` / `readToolFile` operations, all
//! wired as handlers on an [`InProcessTransport`] rather than a real MCP
//! server.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::config::{
    ClientConfig, ConnectionType, ToolFilter, TransportConfig, BIFROST_INTERNAL,
};
use crate::context::RequestContext;
use crate::error::GatewayError;
use crate::manager::Manager;
use crate::sandbox::{list_tool_files, read_tool_file, CodeSandbox};
use crate::transport::{InProcessTransport, TransportError};

fn text_result(text: impl Into<String>) -> Value {
    json!({ "content": [{ "type": "text", "text": text.into() }] })
}

fn tool_spec(name: &str, description: &str, input_schema: Value) -> Value {
    json!({ "name": name, "description": description, "inputSchema": input_schema })
}

/// Builds the `bifrostInternal` client and registers it with `manager`.
///
/// `sandbox` is `None` when no code-mode clients are configured at all —
/// `executeToolCode` is then simply absent from `tools/list` rather than
/// present-but-always-erroring.
pub async fn register_builtin_client(
    manager: Arc<Manager>,
    sandbox: Option<Arc<CodeSandbox>>,
) -> Result<(), GatewayError> {
    let config = ClientConfig {
        id: BIFROST_INTERNAL.to_string(),
        name: BIFROST_INTERNAL.to_string(),
        connection_type: ConnectionType::InProcess,
        transport: TransportConfig::InProcess,
        tools_to_execute: ToolFilter::All,
        tools_to_auto_execute: ToolFilter::All,
        is_code_mode_client: false,
        call_timeout_secs: None,
    };

    let manager_for_calls = Arc::clone(&manager);
    let has_sandbox = sandbox.is_some();
    let sandbox_for_exec = sandbox;

    let transport = InProcessTransport::builder()
        .method("tools/list", move |_params| {
            let has_sandbox = has_sandbox;
            async move {
                let mut tools = vec![
                    tool_spec(
                        "echo",
                        "Returns the given text unchanged.",
                        json!({"type": "object", "properties": {"text": {"type": "string"}}, "required": ["text"]}),
                    ),
                    tool_spec(
                        "calculator",
                        "Applies a binary arithmetic operation (`add`, `subtract`, `multiply`, `divide`) to `x` and `y`.",
                        json!({
                            "type": "object",
                            "properties": {
                                "operation": {"type": "string", "enum": ["add", "subtract", "multiply", "divide"]},
                                "x": {"type": "number"},
                                "y": {"type": "number"}
                            },
                            "required": ["operation", "x", "y"]
                        }),
                    ),
                    tool_spec(
                        "get_weather",
                        "Returns a mock weather report for a city. Requires approval.",
                        json!({"type": "object", "properties": {"city": {"type": "string"}}, "required": ["city"]}),
                    ),
                    tool_spec(
                        "listToolFiles",
                        "Lists virtual tool spec files for code-mode clients.",
                        json!({"type": "object", "properties": {}}),
                    ),
                    tool_spec(
                        "readToolFile",
                        "Reads a code-mode client's virtual `<clientName>.rhai` type stub, optionally sliced to a 1-indexed line range.",
                        json!({
                            "type": "object",
                            "properties": {
                                "fileName": {"type": "string"},
                                "startLine": {"type": "integer"},
                                "endLine": {"type": "integer"}
                            },
                            "required": ["fileName"]
                        }),
                    ),
                ];
                if has_sandbox {
                    tools.push(tool_spec(
                        "executeToolCode",
                        "Runs a script against the code-mode sandbox; each code-mode client is bound as a top-level object exposing its permitted tools as callable attributes.",
                        json!({"type": "object", "properties": {"script": {"type": "string"}}, "required": ["script"]}),
                    ));
                }
                Ok(json!({ "tools": tools }))
            }
        })
        .method("tools/call", move |params| {
            let manager = Arc::clone(&manager_for_calls);
            let sandbox = sandbox_for_exec.clone();
            async move { dispatch_builtin_call(&manager, sandbox, params).await }
        })
        .build();

    let client = crate::client::Client::with_in_process_transport(config, transport).await?;
    manager.add_connected_client(client).await
}

async fn dispatch_builtin_call(
    manager: &Arc<Manager>,
    sandbox: Option<Arc<CodeSandbox>>,
    params: Value,
) -> Result<Value, TransportError> {
    let name = params
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| TransportError::Malformed("missing tool name".into()))?;
    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

    match name {
        "echo" => {
            let text = arguments.get("text").and_then(|v| v.as_str()).unwrap_or("");
            Ok(text_result(text))
        }
        "calculator" => {
            let operation = arguments
                .get("operation")
                .and_then(|v| v.as_str())
                .ok_or_else(|| TransportError::Malformed("missing operation".into()))?;
            let x = arguments
                .get("x")
                .and_then(|v| v.as_f64())
                .ok_or_else(|| TransportError::Malformed("missing x".into()))?;
            let y = arguments
                .get("y")
                .and_then(|v| v.as_f64())
                .ok_or_else(|| TransportError::Malformed("missing y".into()))?;
            match apply_calculator_operation(operation, x, y) {
                Ok(result) => Ok(json!({
                    "content": [{"type": "text", "text": json!({"result": result}).to_string()}],
                    "structuredContent": {"result": result}
                })),
                Err(e) => Ok(json!({
                    "isError": true,
                    "content": [{"type": "text", "text": e}]
                })),
            }
        }
        "get_weather" => {
            let city = arguments.get("city").and_then(|v| v.as_str()).unwrap_or("unknown");
            Ok(text_result(format!("{city}: 22C, clear skies (mock)")))
        }
        "listToolFiles" => {
            let paths = list_tool_files(manager).await;
            Ok(text_result(
                serde_json::to_string(&paths).unwrap_or_else(|_| "[]".into()),
            ))
        }
        "readToolFile" => {
            let file_name = arguments
                .get("fileName")
                .and_then(|v| v.as_str())
                .ok_or_else(|| TransportError::Malformed("missing fileName".into()))?;
            let start_line = arguments.get("startLine").and_then(|v| v.as_u64()).map(|n| n as usize);
            let end_line = arguments.get("endLine").and_then(|v| v.as_u64()).map(|n| n as usize);
            match read_tool_file(manager, file_name, start_line, end_line).await {
                Ok(body) => Ok(text_result(body)),
                Err(e) => Ok(json!({
                    "isError": true,
                    "content": [{"type": "text", "text": e.to_string()}]
                })),
            }
        }
        "executeToolCode" => {
            let sandbox = sandbox
                .ok_or_else(|| TransportError::Rpc("no code-mode clients configured".into()))?;
            let script = arguments
                .get("script")
                .and_then(|v| v.as_str())
                .ok_or_else(|| TransportError::Malformed("missing script".into()))?;
            let ctx = RequestContext::new();
            match sandbox.execute_tool_code(&ctx, script).await {
                Ok(formatted) => Ok(text_result(formatted)),
                Err(e) => Ok(json!({
                    "isError": true,
                    "content": [{"type": "text", "text": e.to_string()}]
                })),
            }
        }
        other => Err(TransportError::Rpc(format!("no such tool: {other}"))),
    }
}

/// Applies one binary arithmetic operation. No general expression grammar:
/// the calculator tool exists to exercise the auto-execute path in tests
/// and demos, not to be a real calculator.
fn apply_calculator_operation(operation: &str, x: f64, y: f64) -> Result<f64, String> {
    match operation {
        "add" => Ok(x + y),
        "subtract" => Ok(x - y),
        "multiply" => Ok(x * y),
        "divide" if y != 0.0 => Ok(x / y),
        "divide" => Err("division by zero".into()),
        other => Err(format!("unknown operation: {other}")),
    }
}
