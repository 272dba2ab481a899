//! `mcp-gateway`: a thin demonstration binary for the tool-execution
//! gateway. It is not a host — it has no agent loop, no LLM client, no
//! conversation state — it only exercises the gateway's tool-execution
//! surface directly from the command line: list/show/call qualified
//! tools, and run code-mode scripts against the sandbox.
//!
//! Subcommands: `tool list`, `tool show <name>`, `tool call <name> <args>`,
//! `code exec <script>`.

mod log_format;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use gateway_core::api::GatewayBuilder;
use gateway_core::config::ClientConfig;
use gateway_core::context::RequestContext;
use gateway_core::message::ToolCall;

#[derive(Parser)]
#[command(name = "mcp-gateway", about = "Demonstration CLI for the MCP tool-execution gateway")]
struct Args {
    /// Path to a TOML client-config list (spec.md §3). Defaults to just the
    /// built-in `bifrostInternal` client when omitted.
    #[arg(long, env = "GATEWAY_CLIENTS")]
    clients: Option<PathBuf>,

    /// Print results as raw JSON instead of a human-readable summary.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inspect or invoke tools exposed by configured clients.
    #[command(subcommand)]
    Tool(ToolCommand),
    /// Run a script against the code-mode sandbox.
    #[command(subcommand)]
    Code(CodeCommand),
}

#[derive(Subcommand)]
enum ToolCommand {
    /// List every qualified tool name visible across all clients.
    List,
    /// Show one tool's description and input schema.
    Show {
        /// Qualified tool name, e.g. `bifrostInternal-echo`.
        name: String,
    },
    /// Call one tool directly, bypassing the agent loop and the part of the
    /// plugin pipeline a host would normally run first.
    Call {
        /// Qualified tool name, e.g. `bifrostInternal-echo`.
        name: String,
        /// Arguments as a JSON object, e.g. `{"text":"hi"}`.
        arguments: String,
    },
}

#[derive(Subcommand)]
enum CodeCommand {
    /// Evaluate a script against every code-mode client's bound namespace.
    Exec {
        /// Inline script source. Mutually exclusive with `--file`.
        script: Option<String>,
        /// Read the script from a file instead of the command line.
        #[arg(long, conflicts_with = "script")]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    gateway_config::load_and_apply("mcp-gateway", None)?;
    logging::init()?;

    let args = Args::parse();

    let configs: Vec<ClientConfig> = match &args.clients {
        Some(path) => gateway_config::load_gateway_config(path)?,
        None => Vec::new(),
    };

    let gateway = GatewayBuilder::new().with_clients(configs).build().await?;
    let ctx = RequestContext::new();

    match args.command {
        Command::Tool(ToolCommand::List) => {
            let tools = gateway.manager().get_tools_per_client(&ctx).await;
            if args.json {
                let flat: Vec<&String> = tools.values().flat_map(|t| t.keys()).collect();
                println!("{}", serde_json::to_string_pretty(&flat)?);
            } else {
                for (client, client_tools) in &tools {
                    println!("{client}:");
                    for qualified_name in client_tools.keys() {
                        println!("  {qualified_name}");
                    }
                }
            }
        }
        Command::Tool(ToolCommand::Show { name }) => {
            let tools = gateway.manager().get_tools_per_client(&ctx).await;
            let found = tools.values().find_map(|client_tools| client_tools.get(&name));
            match found {
                Some(spec) => {
                    if args.json {
                        let rendered = serde_json::json!({
                            "name": spec.name,
                            "description": spec.description,
                            "inputSchema": spec.input_schema,
                        });
                        println!("{}", serde_json::to_string_pretty(&rendered)?);
                    } else {
                        println!("{}", spec.name);
                        if let Some(description) = &spec.description {
                            println!("  {description}");
                        }
                        println!("  input schema: {}", spec.input_schema);
                    }
                }
                None => {
                    eprintln!("tool not found: {name}");
                    std::process::exit(1);
                }
            }
        }
        Command::Tool(ToolCommand::Call { name, arguments }) => {
            let result = gateway
                .dispatcher()
                .dispatch(
                    &ctx,
                    ToolCall {
                        call_id: "cli".to_string(),
                        tool_name: name,
                        arguments_json: arguments,
                    },
                )
                .await;
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "content": result.content,
                        "isError": result.is_error,
                    }))?
                );
            } else {
                println!("{}", result.content);
            }
            if result.is_error {
                std::process::exit(1);
            }
        }
        Command::Code(CodeCommand::Exec { script, file }) => {
            let script = match (script, file) {
                (Some(s), None) => s,
                (None, Some(path)) => std::fs::read_to_string(path)?,
                _ => {
                    eprintln!("provide either an inline script or --file, not both");
                    std::process::exit(2);
                }
            };
            let sandbox = gateway.sandbox().ok_or("no code-mode clients configured")?;
            match sandbox.execute_tool_code(&ctx, &script).await {
                Ok(output) => println!("{output}"),
                Err(e) => {
                    eprintln!("{e}");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
