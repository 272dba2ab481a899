//! `listToolFiles` / `readToolFile` (spec.md §4.7): lets sandboxed code
//! discover the shape of each code-mode client's tools without having to
//! embed every tool's JSON schema in the script prompt up front.
//!
//! Files are virtual, one per code-mode client, named `<clientName>.rhai`
//! (spec's illustrative stub extension was `.pyi`, an artifact of the
//! distillation source's Python-flavored pseudocode rather than a format
//! requirement — ours is rhai-based, so the stub describes rhai call
//! syntax instead; see DESIGN.md). They are resolved only against the
//! internal tool catalog, never against a real filesystem, and any
//! anomaly — unknown client, malformed name, traversal attempt — reports
//! the same "No server found matching" message (spec.md §8 scenario S6),
//! so a caller probing for valid names cannot distinguish "rejected as
//! unsafe" from "no such client".

use std::fmt;
use std::sync::Arc;

use crate::config::is_valid_identifier;
use crate::manager::Manager;

/// The sandbox's only virtual-filesystem failure mode. Deliberately single
/// (not an enum per failure cause) so every anomaly renders identically,
/// per spec.md §4.7's "any anomaly returns 'No server found matching'".
#[derive(Debug)]
pub struct ToolFileError(String);

impl fmt::Display for ToolFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "No server found matching {:?}", self.0)
    }
}

impl std::error::Error for ToolFileError {}

const STUB_EXTENSION: &str = ".rhai";

/// Lists `<clientName>.rhai` virtual paths for every code-mode client
/// currently connected and ready.
pub async fn list_tool_files(manager: &Arc<Manager>) -> Vec<String> {
    let mut paths = Vec::new();
    for config in manager.get_clients().await {
        if !config.is_code_mode_client {
            continue;
        }
        if let Ok(state) = manager.get_client_state(&config.name).await {
            if state != crate::client::ClientState::Ready {
                continue;
            }
        }
        paths.push(format!("{}{STUB_EXTENSION}", config.name));
    }
    paths
}

/// Reads the type-stub body for one code-mode client's `<clientName>.rhai`
/// virtual file, optionally sliced to a 1-indexed, inclusive line range
/// (spec.md §4.7: `readToolFile(fileName, startLine?, endLine?)`).
pub async fn read_tool_file(
    manager: &Arc<Manager>,
    file_name: &str,
    start_line: Option<usize>,
    end_line: Option<usize>,
) -> Result<String, ToolFileError> {
    let client_name = validate_file_name(file_name)?;

    let config = manager
        .get_clients()
        .await
        .into_iter()
        .find(|c| c.is_code_mode_client && c.name == client_name)
        .ok_or_else(|| ToolFileError(file_name.to_string()))?;

    let ctx = crate::context::RequestContext::new();
    let tools = manager.get_tools_per_client(&ctx).await;
    let client_tools = tools.get(&config.name).ok_or_else(|| ToolFileError(file_name.to_string()))?;

    let body = render_stub(&config.name, client_tools);
    Ok(slice_lines(&body, start_line, end_line))
}

/// Rejects path separators, `..`, absolute paths, and URL-encoded
/// traversal (`%2e%2e`, `%2f`, ...) before the name is ever used to look
/// anything up — spec.md §4.7: "validated strictly... resolved only
/// against the internal virtual file store".
fn validate_file_name(file_name: &str) -> Result<String, ToolFileError> {
    let reject = || ToolFileError(file_name.to_string());

    if file_name.is_empty()
        || file_name.contains('/')
        || file_name.contains('\\')
        || file_name.contains("..")
        || file_name.contains('%')
        || file_name.starts_with('.')
    {
        return Err(reject());
    }
    let client_name = file_name.strip_suffix(STUB_EXTENSION).ok_or_else(reject)?;
    if !is_valid_identifier(client_name) {
        return Err(reject());
    }
    Ok(client_name.to_string())
}

fn render_stub(client_name: &str, tools: &indexmap::IndexMap<String, crate::client::ToolSpec>) -> String {
    let mut body = format!("// {client_name}: code-mode tool namespace\n");
    for spec in tools.values() {
        let description = spec.description.as_deref().unwrap_or("");
        body.push_str(&format!("// {description}\n"));
        body.push_str(&format!("fn {}(args); // args: {}\n", spec.name, spec.input_schema));
    }
    body
}

fn slice_lines(body: &str, start_line: Option<usize>, end_line: Option<usize>) -> String {
    if start_line.is_none() && end_line.is_none() {
        return body.to_string();
    }
    let lines: Vec<&str> = body.lines().collect();
    let start = start_line.unwrap_or(1).max(1) - 1;
    let end = end_line.unwrap_or(lines.len()).min(lines.len());
    if start >= end {
        return String::new();
    }
    lines[start..end].join("\n")
}
