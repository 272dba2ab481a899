//! Code-mode sandbox (C8, spec.md §4.7): runs host-supplied script against a
//! restricted interpreter with each code-mode client bound as a namespaced
//! object exposing its tools as callable attributes.
//!
//! Grounded on `rhai` — the embedded scripting engine used by
//! `Brainwires-tool-orchestrator` (whose own description is "Rhai-based
//! tool orchestration for AI agents - implements Anthropic's programmatic
//! tool calling pattern", i.e. this exact feature) and by
//! `ConaryLabs-Mira/crates/mira-server`. The namespaced-object binding
//! (step 2 below) leans on rhai's object-map OOP emulation: an object map
//! whose field holds a function pointer can be called in method-call
//! syntax (`obj.field(args)`), and rhai passes the map itself as the
//! function's first parameter — exactly the "attribute access dispatches a
//! call" shape the sandbox needs, without synthesizing script source text
//! per tool.

mod virtual_fs;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rhai::{Dynamic, Engine, EvalAltResult, FnPtr, Map, Scope};
use tracing::instrument;

use crate::context::RequestContext;
use crate::error::GatewayError;
use crate::manager::Manager;
use crate::message::ToolCall;

pub use virtual_fs::{list_tool_files, read_tool_file, ToolFileError};

/// Per-execution budget (spec.md §4.7 step 4: "wall-clock ≤ 30s
/// (configurable)... no host-runtime reflection"). `max_operations` bounds
/// runaway loops; `wall_clock` bounds scripts that are individually
/// fast-ticking but block on tool calls forever.
#[derive(Clone, Copy, Debug)]
pub struct SandboxBudget {
    pub max_operations: u64,
    pub wall_clock: Duration,
}

impl Default for SandboxBudget {
    fn default() -> Self {
        Self {
            max_operations: 10_000_000,
            wall_clock: Duration::from_secs(30),
        }
    }
}

/// Runs sandboxed tool code against the current set of code-mode clients.
pub struct CodeSandbox {
    manager: Arc<Manager>,
    budget: SandboxBudget,
}

impl CodeSandbox {
    pub fn new(manager: Arc<Manager>, budget: SandboxBudget) -> Self {
        Self { manager, budget }
    }

    /// Executes `script` (spec.md §4.7's `executeToolCode`). A fresh
    /// interpreter is built for every call — no binding or state survives
    /// from one invocation to the next (step 1 and the "sandbox isolation"
    /// invariant, spec.md §4.7 / §8 scenario 6).
    #[instrument(skip(self, script, ctx))]
    pub async fn execute_tool_code(&self, ctx: &RequestContext, script: &str) -> Result<String, GatewayError> {
        let deadline = Instant::now() + self.budget.wall_clock;
        let ctx = ctx.clone().with_deadline(deadline);

        let code_mode_clients: Vec<String> = self
            .manager
            .get_clients()
            .await
            .into_iter()
            .filter(|config| config.is_code_mode_client)
            .map(|config| config.name)
            .collect();
        let tools_per_client = self.manager.get_tools_per_client(&ctx).await;

        let manager = Arc::clone(&self.manager);
        let script = script.to_string();
        let budget = self.budget;
        let call_ctx = ctx.clone();

        tokio::task::spawn_blocking(move || {
            run_script(&manager, &call_ctx, &script, budget, &code_mode_clients, &tools_per_client)
        })
        .await
        .map_err(|e| GatewayError::Agent(format!("sandbox task panicked: {e}")))?
    }
}

/// Builds the interpreter, binds one object per code-mode client, runs
/// `script` to completion, and renders the spec.md §4.7 step 5 output
/// format. Runs on a blocking-safe thread: rhai's `Engine::eval` is
/// synchronous, and each bound tool call bridges back into the async
/// `Manager` via `futures::executor::block_on`, the same way the teacher's
/// stdio session bridges its synchronous protocol loop into async callers
/// with `task::block_in_place`.
fn run_script(
    manager: &Arc<Manager>,
    ctx: &RequestContext,
    script: &str,
    budget: SandboxBudget,
    code_mode_clients: &[String],
    tools_per_client: &indexmap::IndexMap<String, indexmap::IndexMap<String, crate::client::ToolSpec>>,
) -> Result<String, GatewayError> {
    let mut engine = Engine::new();
    engine.set_max_operations(budget.max_operations);
    engine.set_max_expr_depths(64, 64);
    engine.set_max_string_size(1_000_000);
    engine.set_max_array_size(10_000);
    engine.set_max_map_size(10_000);

    let start = Instant::now();
    let wall_clock = budget.wall_clock;
    engine.on_progress(move |_ops| {
        if start.elapsed() > wall_clock {
            Some(Dynamic::UNIT)
        } else {
            None
        }
    });

    let console = Arc::new(Mutex::new(Vec::<String>::new()));
    let print_console = Arc::clone(&console);
    engine.on_print(move |s| print_console.lock().unwrap().push(s.to_string()));
    let debug_console = Arc::clone(&console);
    engine.on_debug(move |s, src, pos| {
        let label = src.unwrap_or("");
        debug_console.lock().unwrap().push(format!("{label} @ {pos:?}: {s}"));
    });

    let mut scope = Scope::new();
    bind_client_namespaces(&mut engine, &mut scope, manager, ctx, code_mode_clients, tools_per_client);

    let eval_result = engine.eval_with_scope::<Dynamic>(&mut scope, script);
    let return_value = match eval_result {
        Ok(final_expr_value) => scope
            .get_value::<Dynamic>("result")
            .unwrap_or(final_expr_value),
        Err(err) => return Err(render_rhai_error(err)),
    };

    let json = dynamic_to_json(return_value)?;
    let console_output = console.lock().unwrap().join("\n");
    Ok(format!("Console output:\n{console_output}\n\nReturn value: {json}"))
}

/// Step 2 of spec.md §4.7: binds one object map per code-mode client
/// visible under `ctx`, with one function-pointer-valued field per tool the
/// combined (config ∩ context) filter permits. Tools outside that set have
/// no corresponding field, so scripts referencing them fail with rhai's own
/// "variable not found" / "property not found" errors rather than a
/// gateway-specific permission error (spec.md §8 scenario S5).
fn bind_client_namespaces(
    engine: &mut Engine,
    scope: &mut Scope,
    manager: &Arc<Manager>,
    ctx: &RequestContext,
    code_mode_clients: &[String],
    tools_per_client: &indexmap::IndexMap<String, indexmap::IndexMap<String, crate::client::ToolSpec>>,
) {
    let mut next_fn_id = 0usize;
    for client_name in code_mode_clients {
        let Some(tools) = tools_per_client.get(client_name) else {
            continue;
        };
        let mut object = Map::new();
        for qualified_name in tools.keys() {
            let tool_name = crate::config::unqualify(qualified_name)
                .map(|(_, tool)| tool.to_string())
                .unwrap_or_else(|| qualified_name.clone());

            let fn_name = format!("__sandbox_tool_{next_fn_id}");
            next_fn_id += 1;

            let manager = Arc::clone(manager);
            let ctx = ctx.clone();
            let qualified_name = qualified_name.clone();
            engine.register_fn(
                fn_name.as_str(),
                move |_this: Map, args: Map| -> Result<Dynamic, Box<EvalAltResult>> {
                    invoke_tool(&manager, &ctx, &qualified_name, args)
                },
            );

            object.insert(tool_name.into(), Dynamic::from(FnPtr::new(fn_name).unwrap()));
        }
        scope.push(client_name.clone(), Dynamic::from(object));
    }
}

/// Bridges one sandboxed attribute call into a real dispatch (spec.md §4.7
/// step 3: "invokes the Dispatcher synchronously... returns the parsed
/// result"). A failing tool call raises a script exception rather than
/// returning a value that merely looks like an error (step 6).
fn invoke_tool(
    manager: &Arc<Manager>,
    ctx: &RequestContext,
    qualified_name: &str,
    args: Map,
) -> Result<Dynamic, Box<EvalAltResult>> {
    let arguments_value = map_to_json(args);
    let arguments_json = arguments_value.to_string();
    let qualified_name = qualified_name.to_string();
    let result = futures::executor::block_on({
        let manager = Arc::clone(manager);
        let ctx = ctx.clone();
        async move {
            manager
                .execute_tool_call(
                    &ctx,
                    ToolCall {
                        call_id: "sandbox".into(),
                        tool_name: qualified_name,
                        arguments_json,
                    },
                )
                .await
        }
    });

    if result.is_error {
        return Err(result.content.into());
    }
    let json: serde_json::Value =
        serde_json::from_str(&result.content).unwrap_or(serde_json::Value::String(result.content));
    rhai::serde::to_dynamic(&json).map_err(|e| format!("could not convert tool result: {e}").into())
}

fn map_to_json(map: Map) -> serde_json::Value {
    serde_json::Value::Object(
        map.into_iter()
            .filter_map(|(k, v)| dynamic_to_json(v).ok().map(|v| (k.to_string(), v)))
            .collect(),
    )
}

/// Maps rhai's own failure modes onto the gateway's error taxonomy.
/// `ErrorVariableNotFound` covers both "no such client" (the top-level
/// identifier is unbound) and "no such tool" (the client object has no
/// matching field) — both render as `undefined: <name>`, matching spec.md
/// §8 scenario S5's literal expectation.
fn render_rhai_error(err: Box<EvalAltResult>) -> GatewayError {
    match *err {
        EvalAltResult::ErrorTerminated(..) => GatewayError::Timeout("sandbox script exceeded its wall-clock budget".into()),
        EvalAltResult::ErrorVariableNotFound(name, _) => GatewayError::Tool(format!("undefined: {name}")),
        other => GatewayError::Tool(other.to_string()),
    }
}

/// Converts a rhai return value into `serde_json::Value` so the dispatcher
/// can wrap it as an ordinary tool result, same as any MCP `tools/call`
/// return.
fn dynamic_to_json(value: Dynamic) -> Result<serde_json::Value, GatewayError> {
    rhai::serde::from_dynamic::<serde_json::Value>(&value)
        .or_else(|_| {
            if value.is_array() {
                let array = value.into_array().unwrap_or_default();
                Ok(serde_json::Value::Array(
                    array.into_iter().filter_map(|v| dynamic_to_json(v).ok()).collect(),
                ))
            } else if value.is_map() {
                let map: Map = value.cast();
                Ok(serde_json::Value::Object(
                    map.into_iter()
                        .filter_map(|(k, v)| dynamic_to_json(v).ok().map(|v| (k.to_string(), v)))
                        .collect(),
                ))
            } else {
                Ok(serde_json::Value::String(value.to_string()))
            }
        })
        .map_err(|e: serde_json::Error| GatewayError::Tool(format!("could not render script result: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use crate::config::{ClientConfig, ConnectionType, ToolFilter, TransportConfig, BIFROST_INTERNAL};
    use crate::transport::InProcessTransport;
    use serde_json::json;

    async fn echo_client(manager: &Arc<Manager>, code_mode: bool) {
        let config = ClientConfig {
            id: BIFROST_INTERNAL.to_string(),
            name: BIFROST_INTERNAL.to_string(),
            connection_type: ConnectionType::InProcess,
            transport: TransportConfig::InProcess,
            tools_to_execute: ToolFilter::All,
            tools_to_auto_execute: ToolFilter::All,
            is_code_mode_client: code_mode,
            call_timeout_secs: None,
        };
        let transport = InProcessTransport::builder()
            .method("tools/list", |_params| async move {
                Ok(json!({
                    "tools": [
                        {"name": "echo", "description": "echoes", "inputSchema": {"type": "object"}}
                    ]
                }))
            })
            .method("tools/call", |params| async move {
                let message = params
                    .get("arguments")
                    .and_then(|a| a.get("message"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                Ok(json!({"content": [{"type": "text", "text": message}]}))
            })
            .build();
        let client = Client::with_in_process_transport(config, transport).await.unwrap();
        manager.add_connected_client(client).await.unwrap();
    }

    #[tokio::test]
    async fn executes_a_script_with_no_tool_calls() {
        let manager = Arc::new(Manager::new());
        let sandbox = CodeSandbox::new(manager, SandboxBudget::default());
        let result = sandbox
            .execute_tool_code(&RequestContext::new(), "result = 1 + 1;")
            .await
            .unwrap();
        assert!(result.contains("Return value: 2"), "got: {result}");
    }

    #[tokio::test]
    async fn composes_a_code_mode_client_call_through_its_bound_namespace() {
        let manager = Arc::new(Manager::new());
        echo_client(&manager, true).await;
        let sandbox = CodeSandbox::new(manager, SandboxBudget::default());
        let script = r#"let r = bifrostInternal.echo(#{message: "hi"}); result = r;"#;
        let result = sandbox.execute_tool_code(&RequestContext::new(), script).await.unwrap();
        assert!(result.contains("hi"), "got: {result}");
    }

    #[tokio::test]
    async fn a_script_that_references_a_filtered_out_client_surfaces_as_undefined() {
        let manager = Arc::new(Manager::new());
        echo_client(&manager, true).await;
        let ctx = RequestContext::new().with_include_clients(ToolFilter::named(["other"]));
        let sandbox = CodeSandbox::new(manager, SandboxBudget::default());
        let err = sandbox
            .execute_tool_code(&ctx, "bifrostInternal.echo(#{message: \"hi\"});")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Tool);
        assert!(err.to_string().contains("undefined: bifrostInternal"), "got: {err}");
    }

    #[tokio::test]
    async fn a_non_code_mode_client_is_not_bound_at_all() {
        let manager = Arc::new(Manager::new());
        echo_client(&manager, false).await;
        let sandbox = CodeSandbox::new(manager, SandboxBudget::default());
        let err = sandbox
            .execute_tool_code(&RequestContext::new(), "bifrostInternal.echo(#{message: \"hi\"});")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("undefined: bifrostInternal"), "got: {err}");
    }

    #[tokio::test]
    async fn a_tool_error_inside_a_script_surfaces_as_a_gateway_tool_error() {
        let manager = Arc::new(Manager::new());
        let sandbox = CodeSandbox::new(manager, SandboxBudget::default());
        let err = sandbox
            .execute_tool_code(&RequestContext::new(), "nope.something(#{});")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Tool);
    }
}
