//! Process-level behavior of the server binary.

use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn server() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_ops_tool_server"));
    command
        .env_remove("RUST_LOG")
        .env_remove("MCP_ROOT_PATH")
        .env_remove("MCP_LOG_FILE")
        .env("MCP_LOG_LEVEL", "warn");
    command
}

fn wait_with_deadline(child: &mut Child, limit: Duration) -> Option<std::process::ExitStatus> {
    let started = Instant::now();
    while started.elapsed() < limit {
        if let Some(status) = child.try_wait().unwrap() {
            return Some(status);
        }
        thread::sleep(Duration::from_millis(50));
    }
    None
}

#[test]
fn test_clean_exit_on_end_of_input() {
    let mut child = server()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let mut stdin = child.stdin.take().unwrap();
    stdin.write_all(b"{\"id\":1,\"method\":\"ping\"}\n").unwrap();
    drop(stdin);

    let mut output = String::new();
    child.stdout.take().unwrap().read_to_string(&mut output).unwrap();
    let status = wait_with_deadline(&mut child, Duration::from_secs(10)).unwrap();

    assert!(status.success());
    let response: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
    assert_eq!(response["id"], 1);
    assert_eq!(response["result"], serde_json::json!({}));
}

#[cfg(unix)]
#[test]
fn test_exits_nonzero_when_output_closes() {
    let mut child = server()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    // The host goes away on the reading side but keeps stdin open
    drop(child.stdout.take());
    let mut stdin = child.stdin.take().unwrap();
    stdin.write_all(b"{\"id\":1,\"method\":\"ping\"}\n").unwrap();
    stdin.flush().unwrap();

    let status = wait_with_deadline(&mut child, Duration::from_secs(10));
    if status.is_none() {
        let _ = child.kill();
    }
    drop(stdin);

    let status = status.expect("server still running after its output closed");
    assert!(!status.success());
}

#[test]
fn test_configuration_warnings_are_logged() {
    let output = server()
        .env("MCP_MAX_RESULT_BYTES", "lots")
        .env("MCP_TOOL_TIMEOUTS", "bogus")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .unwrap();

    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Ignoring invalid MCP_MAX_RESULT_BYTES value: lots"));
    assert!(stderr.contains("Ignoring invalid MCP_TOOL_TIMEOUTS entry: bogus"));
    assert!(stderr.contains("MCP_ROOT_PATH not set"));
}
