//! Subprocess execution with kill-on-cancel.
//!
//! Any tool that spawns a child goes through [`run_command`]. The child is
//! killed and reaped when the call is cancelled or its deadline passes, and
//! `kill_on_drop` covers the case where the engine aborts the task outright.

use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::error::{ToolError, ToolResult};
use super::handlers::InvocationContext;

/// Captured result of a finished child process.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutput {
    /// Exit code, `None` when terminated by a signal.
    pub status: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
}

enum Completion {
    Finished(std::io::Result<(Captured, Captured, std::process::ExitStatus)>),
    Cancelled,
    DeadlinePassed,
}

struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

/// Spawn `command`, capture up to `max_output_bytes` of each stream, and wait.
///
/// Returns [`ToolError::Cancelled`] or [`ToolError::Timeout`] after killing
/// the child when the context fires first.
pub async fn run_command(
    mut command: Command,
    ctx: &InvocationContext,
    max_output_bytes: usize,
) -> ToolResult<ProcessOutput> {
    let program = command.as_std().get_program().to_string_lossy().into_owned();
    let started = Instant::now();

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|e| ToolError::execution_failed(format!("failed to start {}: {}", program, e)))?;
    debug!(program = %program, pid = ?child.id(), "Spawned child process");

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ToolError::internal("child stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| ToolError::internal("child stderr was not captured"))?;

    let completion = {
        let collect = async {
            let (out, err, status) = tokio::join!(
                read_bounded(stdout, max_output_bytes),
                read_bounded(stderr, max_output_bytes),
                child.wait()
            );
            Ok::<_, std::io::Error>((out?, err?, status?))
        };

        tokio::select! {
            result = collect => Completion::Finished(result),
            _ = ctx.cancelled() => Completion::Cancelled,
            _ = tokio::time::sleep_until(ctx.deadline()) => Completion::DeadlinePassed,
        }
    };

    match completion {
        Completion::Finished(Ok((stdout, stderr, status))) => Ok(ProcessOutput {
            status: status.code(),
            success: status.success(),
            stdout: String::from_utf8_lossy(&stdout.bytes).into_owned(),
            stderr: String::from_utf8_lossy(&stderr.bytes).into_owned(),
            stdout_truncated: stdout.truncated,
            stderr_truncated: stderr.truncated,
        }),
        Completion::Finished(Err(e)) => Err(ToolError::execution_failed(format!(
            "{} failed while running: {}",
            program, e
        ))),
        Completion::Cancelled => {
            terminate(&mut child, &program).await;
            Err(ToolError::Cancelled)
        }
        Completion::DeadlinePassed => {
            terminate(&mut child, &program).await;
            Err(ToolError::Timeout(started.elapsed()))
        }
    }
}

async fn terminate(child: &mut Child, program: &str) {
    match child.kill().await {
        Ok(()) => debug!(program = %program, "Killed child process"),
        Err(e) => warn!(program = %program, "Failed to kill child process: {}", e),
    }
}

/// Drain `reader` to EOF, keeping the first `limit` bytes.
///
/// Reading continues past the limit so the child never blocks on a full pipe.
async fn read_bounded<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> std::io::Result<Captured> {
    let mut bytes = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(bytes.len());
        if n > room {
            truncated = true;
        }
        bytes.extend_from_slice(&chunk[..n.min(room)]);
    }

    Ok(Captured { bytes, truncated })
}
