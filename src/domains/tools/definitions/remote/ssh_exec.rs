//! Remote command tool definition.
//!
//! Runs a command on a pre-configured host with the system `ssh` client in
//! batch mode. Only aliases listed in the configuration can be targeted.

use std::ffi::OsString;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{info, instrument, warn};

use crate::core::config::{Config, RemoteConfig, RemoteHost, ToolCategory};
use crate::domains::tools::error::{ToolError, ToolResult};
use crate::domains::tools::handlers::{InvocationContext, Tool};
use crate::domains::tools::output::ToolOutput;
use crate::domains::tools::process::{ProcessOutput, run_command};

/// ssh's own exit status for connection and authentication failures.
const SSH_CONNECTION_FAILURE: i32 = 255;

// ============================================================================
// Tool Parameters
// ============================================================================

/// Parameters for the ssh exec tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SshExecParams {
    /// Alias of a configured remote host.
    pub host: String,

    /// Shell command to run on the remote host.
    pub command: String,
}

// ============================================================================
// Tool Definition
// ============================================================================

/// SSH exec tool - runs a command on a configured remote host.
pub struct SshExecTool {
    config: Arc<Config>,
}

impl SshExecTool {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Tool for SshExecTool {
    type Params = SshExecParams;

    const NAME: &'static str = "ssh_exec";

    const DESCRIPTION: &'static str = "Run a shell command on a configured remote host over SSH and return its exit status and output.";

    const CATEGORY: ToolCategory = ToolCategory::Remote;

    #[instrument(skip_all, fields(host = %params.host))]
    async fn execute(&self, params: SshExecParams, ctx: &InvocationContext) -> ToolResult<ToolOutput> {
        info!("SSH exec tool called for host: {}", params.host);

        let remote = &self.config.remote;
        let host = remote.host(&params.host).ok_or_else(|| {
            warn!("Unknown remote host alias: {}", params.host);
            let known: Vec<&str> = remote.hosts.iter().map(|h| h.alias.as_str()).collect();
            ToolError::invalid_arguments(format!(
                "Unknown host '{}'. Configured hosts: [{}]",
                params.host,
                known.join(", ")
            ))
        })?;

        if params.command.trim().is_empty() {
            return Err(ToolError::invalid_arguments("command must not be empty"));
        }

        let mut command = Command::new(&remote.ssh_binary);
        command.args(ssh_args(remote, host, &params.command));

        let output = run_command(command, ctx, remote.max_output_bytes).await?;
        if output.status == Some(SSH_CONNECTION_FAILURE) {
            return Err(ToolError::execution_failed(format!(
                "ssh to '{}' failed: {}",
                params.host,
                output.stderr.trim()
            )));
        }

        info!("Remote command on {} exited with {:?}", params.host, output.status);
        Ok(ToolOutput::Text(format_output(&output)))
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Command line for the ssh client, never prompting for input.
fn ssh_args(remote: &RemoteConfig, host: &RemoteHost, command: &str) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-o".into(),
        "BatchMode=yes".into(),
        "-o".into(),
        format!("ConnectTimeout={}", remote.connect_timeout_secs).into(),
        "-T".into(),
    ];
    if let Some(port) = host.port {
        args.push("-p".into());
        args.push(port.to_string().into());
    }
    if let Some(identity) = &remote.identity_file {
        args.push("-i".into());
        args.push(identity.clone().into_os_string());
    }
    args.push(host.destination().into());
    args.push("--".into());
    args.push(command.into());
    args
}

fn format_output(output: &ProcessOutput) -> String {
    let status = match output.status {
        Some(code) => code.to_string(),
        None => "terminated by signal".to_string(),
    };
    let mut text = format!("exit status: {}\n", status);

    text.push_str("--- stdout ---\n");
    text.push_str(&output.stdout);
    if output.stdout_truncated {
        text.push_str("\n[stdout truncated]");
    }
    if !output.stderr.is_empty() {
        text.push_str("\n--- stderr ---\n");
        text.push_str(&output.stderr);
        if output.stderr_truncated {
            text.push_str("\n[stderr truncated]");
        }
    }
    text
}

// ============================================================================
// Tests
// ============================================================================
