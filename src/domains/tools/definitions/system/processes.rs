//! Process list tool definition.
//!
//! Lists running processes via `ps`, sorted by CPU or memory use.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{info, instrument};

use crate::core::config::ToolCategory;
use crate::domains::tools::error::{ToolError, ToolResult};
use crate::domains::tools::handlers::{InvocationContext, Tool};
use crate::domains::tools::output::ToolOutput;
use crate::domains::tools::process::run_command;

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 500;
const PS_MAX_OUTPUT: usize = 4 * 1024 * 1024;

// ============================================================================
// Tool Parameters
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Cpu,
    Memory,
}

/// Parameters for the process list tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ProcessListParams {
    /// Number of processes to return (default 20, at most 500).
    #[serde(default)]
    pub limit: Option<u32>,

    /// "cpu" (default) or "memory".
    #[serde(default)]
    pub sort_by: SortKey,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessEntry {
    pub pid: u32,
    pub ppid: u32,
    pub user: String,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub rss_bytes: u64,
    pub command: String,
}

// ============================================================================
// Tool Definition
// ============================================================================

/// Process list tool - top processes by resource use.
pub struct ProcessListTool;

#[async_trait]
impl Tool for ProcessListTool {
    type Params = ProcessListParams;

    const NAME: &'static str = "process_list";

    const DESCRIPTION: &'static str = "List running processes with their CPU and memory usage, highest first.";

    const CATEGORY: ToolCategory = ToolCategory::System;

    #[instrument(skip_all, fields(sort_by = ?params.sort_by))]
    async fn execute(&self, params: ProcessListParams, ctx: &InvocationContext) -> ToolResult<ToolOutput> {
        info!("Process list tool called");

        let mut command = Command::new("ps");
        // Trailing '=' suppresses the header row
        command.args(["-eo", "pid=,ppid=,user=,pcpu=,pmem=,rss=,comm="]);

        let output = run_command(command, ctx, PS_MAX_OUTPUT).await?;
        if !output.success {
            return Err(ToolError::execution_failed(format!(
                "ps exited with status {:?}: {}",
                output.status,
                output.stderr.trim()
            )));
        }

        let mut processes = parse_ps(&output.stdout);
        sort_processes(&mut processes, params.sort_by);
        let limit = params
            .limit
            .map_or(DEFAULT_LIMIT, |l| l as usize)
            .min(MAX_LIMIT);
        processes.truncate(limit);

        info!("Returning {} processes", processes.len());
        ToolOutput::json(&processes)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Parse header-less `ps -eo pid,ppid,user,pcpu,pmem,rss,comm` output.
pub fn parse_ps(output: &str) -> Vec<ProcessEntry> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let pid = fields.next()?.parse().ok()?;
            let ppid = fields.next()?.parse().ok()?;
            let user = fields.next()?.to_string();
            let cpu_percent = fields.next()?.parse().ok()?;
            let memory_percent = fields.next()?.parse().ok()?;
            let rss_kib: u64 = fields.next()?.parse().ok()?;
            // Command names may contain spaces
            let command = fields.collect::<Vec<_>>().join(" ");

            Some(ProcessEntry {
                pid,
                ppid,
                user,
                cpu_percent,
                memory_percent,
                rss_bytes: rss_kib * 1024,
                command,
            })
        })
        .collect()
}

fn sort_processes(processes: &mut [ProcessEntry], key: SortKey) {
    match key {
        SortKey::Cpu => processes.sort_by(|a, b| b.cpu_percent.total_cmp(&a.cpu_percent)),
        SortKey::Memory => processes.sort_by(|a, b| b.rss_bytes.cmp(&a.rss_bytes)),
    }
}

// ============================================================================
// Tests
// ============================================================================
