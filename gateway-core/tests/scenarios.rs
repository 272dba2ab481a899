//! End-to-end scenarios exercising the gateway's public surface the way a
//! host application would, rather than one module's internals at a time.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use gateway_core::adapter::chat::{ChatFunctionCall, ChatToolCall};
use gateway_core::agent::{AgentOrchestrator, ConversationTurn, LlmInvoker, LlmTurn, StepOutcome};
use gateway_core::api::GatewayBuilder;
use gateway_core::client::Client;
use gateway_core::config::{ClientConfig, ConnectionType, ToolFilter, TransportConfig};
use gateway_core::context::RequestContext;
use gateway_core::dispatcher::Dispatcher;
use gateway_core::error::GatewayError;
use gateway_core::manager::Manager;
use gateway_core::message::ToolCall;
use gateway_core::plugin::PluginPipeline;
use gateway_core::transport::InProcessTransport;

/// S1 — direct tool call: a Chat-shape `bifrostInternal-calculator` call
/// comes back with the same `toolCallID` and a result that parses to
/// `{"result":8}`.
#[tokio::test]
async fn s1_direct_tool_call() {
    let gateway = GatewayBuilder::new().build().await.unwrap();
    let ctx = RequestContext::new();

    let message = gateway
        .execute_chat_mcp_tool(
            &ctx,
            ChatToolCall {
                id: "call-1".into(),
                call_type: "function".into(),
                function: ChatFunctionCall {
                    name: "bifrostInternal-calculator".into(),
                    arguments: r#"{"operation":"add","x":5,"y":3}"#.into(),
                },
            },
        )
        .await;

    assert_eq!(message.tool_call_id.as_deref(), Some("call-1"));
    let parsed: serde_json::Value = serde_json::from_str(message.content.as_deref().unwrap()).unwrap();
    assert_eq!(parsed, json!({"result": 8.0}));
}

/// S2 — parallel auto-execute, ordered: three `echo` calls dispatched
/// together come back in the order they were requested, regardless of
/// completion order.
#[tokio::test]
async fn s2_parallel_auto_execute_preserves_order() {
    let gateway = GatewayBuilder::new().build().await.unwrap();
    let ctx = RequestContext::new();

    let calls = vec![
        ToolCall { call_id: "1".into(), tool_name: "bifrostInternal-echo".into(), arguments_json: r#"{"text":"a"}"#.into() },
        ToolCall { call_id: "2".into(), tool_name: "bifrostInternal-echo".into(), arguments_json: r#"{"text":"b"}"#.into() },
        ToolCall { call_id: "3".into(), tool_name: "bifrostInternal-echo".into(), arguments_json: r#"{"text":"c"}"#.into() },
    ];
    let results = gateway.dispatcher().dispatch_many(&ctx, calls).await;
    let contents: Vec<&str> = results.iter().map(|r| r.content.as_str()).collect();
    assert_eq!(contents, vec!["a", "b", "c"]);
}

struct ScriptedLlm {
    turns: Mutex<Vec<LlmTurn>>,
    invocations: Mutex<u32>,
}

#[async_trait]
impl LlmInvoker for ScriptedLlm {
    async fn invoke(&self, _history: &[ConversationTurn]) -> Result<LlmTurn, GatewayError> {
        *self.invocations.lock().unwrap() += 1;
        let mut turns = self.turns.lock().unwrap();
        if turns.is_empty() {
            return Ok(LlmTurn::default());
        }
        Ok(turns.remove(0))
    }
}

async fn in_process_client(name: &str, tools_to_execute: ToolFilter, tools_to_auto_execute: ToolFilter, tool_names: &'static [&'static str]) -> Client {
    in_process_client_with_mode(name, tools_to_execute, tools_to_auto_execute, tool_names, false).await
}

async fn in_process_client_with_mode(
    name: &str,
    tools_to_execute: ToolFilter,
    tools_to_auto_execute: ToolFilter,
    tool_names: &'static [&'static str],
    is_code_mode_client: bool,
) -> Client {
    let config = ClientConfig {
        id: name.to_string(),
        name: name.to_string(),
        connection_type: ConnectionType::InProcess,
        transport: TransportConfig::InProcess,
        tools_to_execute,
        tools_to_auto_execute,
        is_code_mode_client,
        call_timeout_secs: None,
    };
    let transport = InProcessTransport::builder()
        .method("tools/list", move |_| {
            let tools: Vec<_> = tool_names.iter().map(|n| json!({"name": n})).collect();
            async move { Ok(json!({"tools": tools})) }
        })
        .method("tools/call", |params| async move {
            let name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
            Ok(json!({"content": [{"type": "text", "text": format!("ran {name}")}]}))
        })
        .build();
    Client::with_in_process_transport(config, transport).await.unwrap()
}

/// S3 — partial approval: `temperature` auto-executes `get_temperature` but
/// not `echo`; `gotest` auto-executes `uuid_generate` but not `hash`. A
/// single LLM turn requesting all four leaves two results and two pending
/// approvals, and the orchestrator does not call the LLM again.
#[tokio::test]
async fn s3_partial_approval() {
    let manager = Arc::new(Manager::new());
    let temperature = in_process_client(
        "temperature",
        ToolFilter::named(["get_temperature", "echo"]),
        ToolFilter::named(["get_temperature"]),
        &["get_temperature", "echo"],
    )
    .await;
    let gotest = in_process_client(
        "gotest",
        ToolFilter::named(["uuid_generate", "hash"]),
        ToolFilter::named(["uuid_generate"]),
        &["uuid_generate", "hash"],
    )
    .await;
    manager.add_connected_client(temperature).await.unwrap();
    manager.add_connected_client(gotest).await.unwrap();

    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&manager), PluginPipeline::new()));
    let llm = Arc::new(ScriptedLlm {
        turns: Mutex::new(vec![LlmTurn {
            content: String::new(),
            tool_calls: vec![
                ToolCall { call_id: "1".into(), tool_name: "temperature-get_temperature".into(), arguments_json: r#"{"city":"Tokyo"}"#.into() },
                ToolCall { call_id: "2".into(), tool_name: "temperature-echo".into(), arguments_json: r#"{"text":"t"}"#.into() },
                ToolCall { call_id: "3".into(), tool_name: "gotest-uuid_generate".into(), arguments_json: "{}".into() },
                ToolCall { call_id: "4".into(), tool_name: "gotest-hash".into(), arguments_json: r#"{"input":"x"}"#.into() },
            ],
            usage: None,
        }]),
        invocations: Mutex::new(0),
    });

    let orchestrator = AgentOrchestrator::new(Arc::clone(&manager), dispatcher, Arc::clone(&llm) as Arc<dyn LlmInvoker>, 5);
    let outcome = orchestrator.run(&RequestContext::new(), vec![]).await.unwrap();

    match outcome {
        StepOutcome::NeedsApproval { history_so_far, pending } => {
            let tool_results: Vec<&str> = history_so_far
                .iter()
                .flat_map(|t| t.tool_results.iter())
                .map(|r| r.call_id.as_str())
                .collect();
            assert_eq!(tool_results.len(), 2);
            assert!(tool_results.contains(&"1"));
            assert!(tool_results.contains(&"3"));

            assert_eq!(pending.len(), 2);
            let pending_names: Vec<&str> = pending.iter().map(|p| p.call.tool_name.as_str()).collect();
            assert!(pending_names.contains(&"temperature-echo"));
            assert!(pending_names.contains(&"gotest-hash"));
        }
        _ => panic!("expected NeedsApproval"),
    }
    assert_eq!(*llm.invocations.lock().unwrap(), 1, "LLM must not be called again while approvals are pending");
}

/// S4 — code-mode composition: a script calling a bound client's tool and
/// assigning the result to `result` comes back with that value in the
/// formatted `Return value:` section.
#[tokio::test]
async fn s4_code_mode_composition() {
    // `bifrostInternal` as registered by `GatewayBuilder` is not code-mode
    // (see builtin::register_builtin_client), so this exercises the
    // sandbox directly against a manager holding a code-mode client of the
    // same name instead of going through the builder.
    let manager = Arc::new(Manager::new());
    let transport = InProcessTransport::builder()
        .method("tools/list", |_| async { Ok(json!({"tools": [{"name": "echo"}]})) })
        .method("tools/call", |params| async move {
            let message = params
                .get("arguments")
                .and_then(|a| a.get("message"))
                .and_then(|v| v.as_str())
                .unwrap_or("");
            Ok(json!({"content": [{"type": "text", "text": message}]}))
        })
        .build();
    let client = Client::with_in_process_transport(
        ClientConfig {
            id: "bifrostInternal".into(),
            name: "bifrostInternal".into(),
            connection_type: ConnectionType::InProcess,
            transport: TransportConfig::InProcess,
            tools_to_execute: ToolFilter::All,
            tools_to_auto_execute: ToolFilter::All,
            is_code_mode_client: true,
            call_timeout_secs: None,
        },
        transport,
    )
    .await
    .unwrap();
    manager.add_connected_client(client).await.unwrap();

    let sandbox = gateway_core::sandbox::CodeSandbox::new(manager, gateway_core::sandbox::SandboxBudget::default());
    let output = sandbox
        .execute_tool_code(&RequestContext::new(), "let r = bifrostInternal.echo(#{message: \"hi\"}); result = r")
        .await
        .unwrap();
    assert!(output.contains("Return value:"));
    assert!(output.contains("hi"));
}

/// S5 — filtering hides server: a context filter that only includes
/// `temperature` makes `gotest` invisible to sandboxed code, so a script
/// referencing it fails with `undefined: gotest` rather than silently
/// skipping the call.
#[tokio::test]
async fn s5_filtering_hides_server_from_sandbox() {
    let manager = Arc::new(Manager::new());
    let gotest = in_process_client_with_mode("gotest", ToolFilter::All, ToolFilter::All, &["uuid_generate"], true).await;
    manager.add_connected_client(gotest).await.unwrap();

    let ctx = RequestContext::new().with_include_clients(ToolFilter::named(["temperature"]));
    let sandbox = gateway_core::sandbox::CodeSandbox::new(manager, gateway_core::sandbox::SandboxBudget::default());
    let err = sandbox.execute_tool_code(&ctx, "gotest.uuid_generate(#{})").await.unwrap_err();
    assert!(err.to_string().contains("undefined: gotest"));
}

/// S6 — path-traversal hardening: `readToolFile` on a traversal path
/// returns the uniform "No server found matching" error without ever
/// touching the real filesystem.
#[tokio::test]
async fn s6_path_traversal_hardening() {
    let manager = Arc::new(Manager::new());
    let err = gateway_core::sandbox::read_tool_file(&manager, "../../../etc/passwd.rhai", None, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("No server found matching"));
}
