//! Read file tool definition.
//!
//! Returns the contents of a file inside the allowed root, as UTF-8 text or
//! base64 for binary content.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{info, instrument, warn};

use crate::core::config::{Config, ToolCategory};
use crate::core::security::validate_path;
use crate::domains::tools::error::{ToolError, ToolResult};
use crate::domains::tools::handlers::{InvocationContext, Tool};
use crate::domains::tools::output::{ToolOutput, decode_utf8};

/// Read limit applied when the caller gives none.
const DEFAULT_MAX_BYTES: u64 = 1024 * 1024;

/// Largest read a caller can ask for.
const MAX_READ_BYTES: u64 = 8 * 1024 * 1024;

// ============================================================================
// Tool Parameters
// ============================================================================

/// How file content is returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContentEncoding {
    #[default]
    Utf8,
    Base64,
}

/// Parameters for the read file tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ReadFileParams {
    /// Path to the file to read.
    pub path: String,

    /// Maximum number of bytes to read (default 1 MiB, at most 8 MiB).
    #[serde(default)]
    pub max_bytes: Option<u64>,

    /// "utf8" (default) or "base64" for binary files.
    #[serde(default)]
    pub encoding: ContentEncoding,
}

// ============================================================================
// Tool Definition
// ============================================================================

/// Read file tool - returns the contents of one file.
pub struct ReadFileTool {
    config: Arc<Config>,
}

impl ReadFileTool {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    type Params = ReadFileParams;

    const NAME: &'static str = "read_file";

    const DESCRIPTION: &'static str = "Read a file and return its contents. Text is returned as-is; use encoding \"base64\" for binary files.";

    const CATEGORY: ToolCategory = ToolCategory::Filesystem;

    #[instrument(skip_all, fields(path = %params.path))]
    async fn execute(&self, params: ReadFileParams, _ctx: &InvocationContext) -> ToolResult<ToolOutput> {
        info!("Read file tool called for path: {}", params.path);

        let path = validate_path(&params.path, &self.config.security).inspect_err(|e| {
            warn!("Path security validation failed: {}", e);
        })?;

        let metadata = fs::metadata(&path).await?;
        if !metadata.is_file() {
            warn!("Path is not a file: {}", params.path);
            return Err(ToolError::invalid_arguments(format!(
                "Path is not a file: {}",
                params.path
            )));
        }

        let limit = read_limit(params.max_bytes);
        let file = fs::File::open(&path).await?;
        let mut bytes = Vec::new();
        file.take(limit).read_to_end(&mut bytes).await?;
        let truncated = metadata.len() > bytes.len() as u64;

        info!("Read {} of {} bytes from {}", bytes.len(), metadata.len(), params.path);

        match params.encoding {
            ContentEncoding::Utf8 => {
                let mut text = decode_utf8(bytes, truncated).map_err(|_| {
                    ToolError::invalid_arguments(format!(
                        "File is not valid UTF-8, use encoding \"base64\": {}",
                        params.path
                    ))
                })?;
                if truncated {
                    text.push_str(&format!(
                        "\n[... truncated: read {} of {} bytes]",
                        limit,
                        metadata.len()
                    ));
                }
                Ok(ToolOutput::Text(text))
            }
            ContentEncoding::Base64 => Ok(ToolOutput::Json(json!({
                "path": params.path,
                "size": metadata.len(),
                "bytesRead": bytes.len(),
                "truncated": truncated,
                "data": BASE64.encode(&bytes),
            }))),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn read_limit(requested: Option<u64>) -> u64 {
    requested.unwrap_or(DEFAULT_MAX_BYTES).min(MAX_READ_BYTES)
}

// ============================================================================
// Tests
// ============================================================================
