use std::process::Command;

fn run_gateway(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_mcp-gateway"))
        .args(args)
        .output()
        .expect("failed to run mcp-gateway binary")
}

#[test]
fn cli_help_succeeds() {
    let out = run_gateway(&["--help"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("gateway"));
    assert!(stdout.contains("tool"));
}

#[test]
fn cli_tool_list_json_includes_the_builtin_client() {
    let out = run_gateway(&["--json", "tool", "list"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.trim_start().starts_with('['));
    assert!(stdout.contains("bifrostInternal-echo"));
}

#[test]
fn cli_tool_show_existing_json_succeeds() {
    let out = run_gateway(&["--json", "tool", "show", "bifrostInternal-echo"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("\"name\""));
    assert!(stdout.contains("echo"));
}

#[test]
fn cli_tool_show_missing_fails() {
    let out = run_gateway(&["tool", "show", "no_such_tool"]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("tool not found"));
}

#[test]
fn cli_tool_call_echo_succeeds() {
    let out = run_gateway(&["tool", "call", "bifrostInternal-echo", "{\"text\":\"hi\"}"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("hi"));
}

#[test]
fn cli_code_exec_without_code_mode_clients_fails_clearly() {
    let out = run_gateway(&["code", "exec", "1 + 1"]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("no code-mode clients configured"));
}
