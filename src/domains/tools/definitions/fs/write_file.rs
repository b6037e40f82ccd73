//! Write file tool definition.
//!
//! Creates, overwrites or appends to a file inside the allowed root.

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};

use crate::core::config::{Config, ToolCategory};
use crate::core::security::validate_new_path;
use crate::domains::tools::error::{ToolError, ToolResult};
use crate::domains::tools::handlers::{InvocationContext, Tool};
use crate::domains::tools::output::ToolOutput;

// ============================================================================
// Tool Parameters
// ============================================================================

/// Parameters for the write file tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct WriteFileParams {
    /// Path of the file to write.
    pub path: String,

    /// Text to write.
    pub content: String,

    /// Append to the file instead of replacing it.
    #[serde(default)]
    pub append: bool,

    /// Create missing parent directories.
    #[serde(default)]
    pub create_dirs: bool,
}

// ============================================================================
// Tool Definition
// ============================================================================

/// Write file tool - writes text content to a file.
pub struct WriteFileTool {
    config: Arc<Config>,
}

impl WriteFileTool {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    type Params = WriteFileParams;

    const NAME: &'static str = "write_file";

    const DESCRIPTION: &'static str = "Write text to a file, replacing it or appending to it. Parent directories are created on request.";

    const CATEGORY: ToolCategory = ToolCategory::Filesystem;

    #[instrument(skip_all, fields(path = %params.path, append = params.append))]
    async fn execute(&self, params: WriteFileParams, _ctx: &InvocationContext) -> ToolResult<ToolOutput> {
        info!("Write file tool called for path: {}", params.path);

        let path = validate_new_path(&params.path, &self.config.security).inspect_err(|e| {
            warn!("Path security validation failed: {}", e);
        })?;

        if path.is_dir() {
            return Err(ToolError::invalid_arguments(format!(
                "Path is a directory: {}",
                params.path
            )));
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                if !params.create_dirs {
                    return Err(ToolError::invalid_arguments(format!(
                        "Parent directory does not exist: {} (set create_dirs to create it)",
                        parent.display()
                    )));
                }
                fs::create_dir_all(parent).await?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(params.append)
            .truncate(!params.append)
            .open(&path)
            .await?;
        file.write_all(params.content.as_bytes()).await?;
        file.flush().await?;

        let verb = if params.append { "Appended" } else { "Wrote" };
        let summary = format!("{} {} bytes to {}", verb, params.content.len(), path.display());
        info!("{}", summary);

        Ok(ToolOutput::Text(summary))
    }
}

// ============================================================================
// Tests
// ============================================================================
