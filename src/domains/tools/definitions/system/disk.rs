//! Disk usage tool definition.
//!
//! Reports mounted filesystem usage by running `df -kP`.

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{info, instrument, warn};

use crate::core::config::{Config, ToolCategory};
use crate::core::security::validate_path;
use crate::domains::tools::definitions::fs::list_dir::format_size;
use crate::domains::tools::error::{ToolError, ToolResult};
use crate::domains::tools::handlers::{InvocationContext, Tool};
use crate::domains::tools::output::ToolOutput;
use crate::domains::tools::process::run_command;

const DF_MAX_OUTPUT: usize = 256 * 1024;

// ============================================================================
// Tool Parameters
// ============================================================================

/// Parameters for the disk usage tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct DiskUsageParams {
    /// Only report the filesystem containing this path.
    #[serde(default)]
    pub path: Option<String>,
}

/// One line of `df` output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesystemUsage {
    pub filesystem: String,
    pub mounted_on: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
    pub use_percent: u8,
    pub summary: String,
}

// ============================================================================
// Tool Definition
// ============================================================================

/// Disk usage tool - reports filesystem capacity and usage.
pub struct DiskUsageTool {
    config: Arc<Config>,
}

impl DiskUsageTool {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Tool for DiskUsageTool {
    type Params = DiskUsageParams;

    const NAME: &'static str = "disk_usage";

    const DESCRIPTION: &'static str = "Report disk usage of mounted filesystems, or of the filesystem holding a given path.";

    const CATEGORY: ToolCategory = ToolCategory::System;

    #[instrument(skip_all)]
    async fn execute(&self, params: DiskUsageParams, ctx: &InvocationContext) -> ToolResult<ToolOutput> {
        info!("Disk usage tool called");

        let mut command = Command::new("df");
        command.arg("-kP");
        if let Some(path) = &params.path {
            let path = validate_path(path, &self.config.security).inspect_err(|e| {
                warn!("Path security validation failed: {}", e);
            })?;
            command.arg(path);
        }

        let output = run_command(command, ctx, DF_MAX_OUTPUT).await?;
        if !output.success {
            return Err(ToolError::execution_failed(format!(
                "df exited with status {:?}: {}",
                output.status,
                output.stderr.trim()
            )));
        }

        let filesystems = parse_df(&output.stdout);
        info!("Reported {} filesystems", filesystems.len());

        ToolOutput::json(&filesystems)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Parse POSIX `df -kP` output (sizes in 1024-byte blocks).
pub fn parse_df(output: &str) -> Vec<FilesystemUsage> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 6 {
                return None;
            }
            let kib = |s: &str| s.parse::<u64>().ok().map(|v| v * 1024);
            let total_bytes = kib(fields[1])?;
            let used_bytes = kib(fields[2])?;
            let available_bytes = kib(fields[3])?;
            let use_percent = fields[4].trim_end_matches('%').parse().unwrap_or(0);
            // Mount points may contain spaces
            let mounted_on = fields[5..].join(" ");

            Some(FilesystemUsage {
                summary: format!(
                    "{} of {} used ({}%) on {}",
                    format_size(used_bytes),
                    format_size(total_bytes),
                    use_percent,
                    mounted_on
                ),
                filesystem: fields[0].to_string(),
                mounted_on,
                total_bytes,
                used_bytes,
                available_bytes,
                use_percent,
            })
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
