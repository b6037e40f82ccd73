//! Memory info tool definition.

use std::collections::HashMap;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::core::config::ToolCategory;
use crate::domains::tools::definitions::fs::list_dir::format_size;
use crate::domains::tools::error::{ToolError, ToolResult};
use crate::domains::tools::handlers::{InvocationContext, Tool};
use crate::domains::tools::output::ToolOutput;

const MEMINFO_PATH: &str = "/proc/meminfo";

/// The memory info tool takes no arguments.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct MemoryInfoParams {}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryInfo {
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub free_bytes: u64,
    pub used_bytes: u64,
    pub used_percent: f64,
    pub swap_total_bytes: u64,
    pub swap_free_bytes: u64,
    pub summary: String,
}

/// Memory info tool - reports RAM and swap usage from `/proc/meminfo`.
pub struct MemoryInfoTool;

#[async_trait]
impl Tool for MemoryInfoTool {
    type Params = MemoryInfoParams;

    const NAME: &'static str = "memory_info";

    const DESCRIPTION: &'static str = "Report total, used and available memory and swap of the host.";

    const CATEGORY: ToolCategory = ToolCategory::System;

    #[instrument(skip_all)]
    async fn execute(&self, _params: MemoryInfoParams, _ctx: &InvocationContext) -> ToolResult<ToolOutput> {
        info!("Memory info tool called");

        let raw = tokio::fs::read_to_string(MEMINFO_PATH)
            .await
            .map_err(|e| ToolError::execution_failed(format!("cannot read {}: {}", MEMINFO_PATH, e)))?;

        let info = parse_meminfo(&raw)
            .ok_or_else(|| ToolError::execution_failed(format!("unexpected format in {}", MEMINFO_PATH)))?;

        ToolOutput::json(&info)
    }
}

/// Parse `/proc/meminfo` (values in kB).
pub fn parse_meminfo(raw: &str) -> Option<MemoryInfo> {
    let fields: HashMap<&str, u64> = raw
        .lines()
        .filter_map(|line| {
            let (key, rest) = line.split_once(':')?;
            let value = rest.split_whitespace().next()?.parse::<u64>().ok()?;
            Some((key.trim(), value * 1024))
        })
        .collect();

    let total_bytes = *fields.get("MemTotal")?;
    let free_bytes = fields.get("MemFree").copied().unwrap_or(0);
    // Older kernels lack MemAvailable
    let available_bytes = fields.get("MemAvailable").copied().unwrap_or_else(|| {
        free_bytes
            + fields.get("Buffers").copied().unwrap_or(0)
            + fields.get("Cached").copied().unwrap_or(0)
    });
    let used_bytes = total_bytes.saturating_sub(available_bytes);
    let used_percent = if total_bytes == 0 {
        0.0
    } else {
        (used_bytes as f64 * 1000.0 / total_bytes as f64).round() / 10.0
    };

    Some(MemoryInfo {
        summary: format!(
            "{} of {} used ({}%), {} available",
            format_size(used_bytes),
            format_size(total_bytes),
            used_percent,
            format_size(available_bytes)
        ),
        total_bytes,
        available_bytes,
        free_bytes,
        used_bytes,
        used_percent,
        swap_total_bytes: fields.get("SwapTotal").copied().unwrap_or(0),
        swap_free_bytes: fields.get("SwapFree").copied().unwrap_or(0),
    })
}
