//! CPU info tool definition.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::core::config::ToolCategory;
use crate::domains::tools::error::{ToolError, ToolResult};
use crate::domains::tools::handlers::{InvocationContext, Tool};
use crate::domains::tools::output::ToolOutput;

/// The CPU info tool takes no arguments.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct CpuInfoParams {}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
    pub running_tasks: Option<u64>,
    pub total_tasks: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct CpuInfo {
    logical_cpus: usize,
    model: Option<String>,
    load_average: Option<LoadAverage>,
}

/// CPU info tool - reports processor model, core count and load.
pub struct CpuInfoTool;

#[async_trait]
impl Tool for CpuInfoTool {
    type Params = CpuInfoParams;

    const NAME: &'static str = "cpu_info";

    const DESCRIPTION: &'static str = "Report the CPU model, number of logical CPUs and the 1/5/15 minute load averages.";

    const CATEGORY: ToolCategory = ToolCategory::System;

    #[instrument(skip_all)]
    async fn execute(&self, _params: CpuInfoParams, _ctx: &InvocationContext) -> ToolResult<ToolOutput> {
        info!("CPU info tool called");

        let logical_cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .map_err(|e| ToolError::execution_failed(format!("cannot determine CPU count: {}", e)))?;

        // Both files are Linux-specific; report what is available elsewhere
        let load_average = match tokio::fs::read_to_string("/proc/loadavg").await {
            Ok(raw) => parse_loadavg(&raw),
            Err(e) => {
                debug!("No /proc/loadavg: {}", e);
                None
            }
        };
        let model = match tokio::fs::read_to_string("/proc/cpuinfo").await {
            Ok(raw) => parse_cpu_model(&raw),
            Err(e) => {
                debug!("No /proc/cpuinfo: {}", e);
                None
            }
        };

        ToolOutput::json(&CpuInfo {
            logical_cpus,
            model,
            load_average,
        })
    }
}

/// Parse `/proc/loadavg`, e.g. `0.52 0.58 0.59 2/1234 5678`.
pub fn parse_loadavg(raw: &str) -> Option<LoadAverage> {
    let mut fields = raw.split_whitespace();
    let one = fields.next()?.parse().ok()?;
    let five = fields.next()?.parse().ok()?;
    let fifteen = fields.next()?.parse().ok()?;
    let tasks = fields.next().and_then(|t| t.split_once('/'));

    Some(LoadAverage {
        one,
        five,
        fifteen,
        running_tasks: tasks.and_then(|(r, _)| r.parse().ok()),
        total_tasks: tasks.and_then(|(_, t)| t.parse().ok()),
    })
}

/// First `model name` entry of `/proc/cpuinfo`.
pub fn parse_cpu_model(raw: &str) -> Option<String> {
    raw.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        (key.trim() == "model name").then(|| value.trim().to_string())
    })
}
