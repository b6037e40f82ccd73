//! List directory tool definition.
//!
//! A tool that lists files and directories in a given path.

use std::collections::BinaryHeap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use schemars::JsonSchema;
use serde::Deserialize;
use tokio::fs;
use tracing::{info, instrument, warn};

use crate::core::config::{Config, ToolCategory};
use crate::core::security::validate_path;
use crate::domains::tools::error::{ToolError, ToolResult};
use crate::domains::tools::handlers::{InvocationContext, Tool};
use crate::domains::tools::output::ToolOutput;

/// Entries listed when the caller gives no limit.
const DEFAULT_LIMIT: usize = 1000;

/// Largest listing a caller can ask for.
const MAX_LIMIT: usize = 10_000;

// ============================================================================
// Tool Parameters
// ============================================================================

/// Parameters for the list directory tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListDirParams {
    /// Path to the directory to list.
    pub path: String,

    /// Include hidden files (starting with '.')
    #[serde(default)]
    pub include_hidden: bool,

    /// Show additional details (type, size, modification time)
    #[serde(default)]
    pub detailed: bool,

    /// Maximum number of entries to return (default 1000, at most 10000).
    #[serde(default)]
    pub limit: Option<u32>,
}

// ============================================================================
// Tool Definition
// ============================================================================

/// List directory tool - lists files and directories in a given path.
pub struct ListDirTool {
    config: Arc<Config>,
}

impl ListDirTool {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    type Params = ListDirParams;

    const NAME: &'static str = "list_dir";

    const DESCRIPTION: &'static str = "List files and directories in a given path. Returns names, types, and optionally sizes and modification times.";

    const CATEGORY: ToolCategory = ToolCategory::Filesystem;

    #[instrument(skip_all, fields(path = %params.path))]
    async fn execute(&self, params: ListDirParams, ctx: &InvocationContext) -> ToolResult<ToolOutput> {
        info!("List directory tool called for path: {}", params.path);

        // Validate path security first
        let path = validate_path(&params.path, &self.config.security).inspect_err(|e| {
            warn!("Path security validation failed: {}", e);
        })?;

        if !path.is_dir() {
            warn!("Path is not a directory: {}", params.path);
            return Err(ToolError::invalid_arguments(format!(
                "Path is not a directory: {}",
                params.path
            )));
        }

        let mut entries = fs::read_dir(&path).await.map_err(|e| {
            warn!("Failed to read directory: {}", e);
            ToolError::execution_failed(format!("Failed to read directory: {}", e))
        })?;

        let cap = entry_limit(params.limit);
        let mut kept = BinaryHeap::new();
        let mut total = 0usize;
        let mut file_count = 0;
        let mut dir_count = 0;

        while let Some(entry) = entries.next_entry().await? {
            ctx.checkpoint()?;

            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();

            // Skip hidden files if not requested
            if !params.include_hidden && name.starts_with('.') {
                continue;
            }

            // symlink_metadata so links are reported as links
            let metadata = match fs::symlink_metadata(entry.path()).await {
                Ok(m) => m,
                Err(e) => {
                    warn!("Failed to get metadata for {}: {}", name, e);
                    continue;
                }
            };

            if params.detailed {
                let entry_type = if metadata.is_dir() {
                    dir_count += 1;
                    "DIR "
                } else if metadata.is_symlink() {
                    "LINK"
                } else {
                    file_count += 1;
                    "FILE"
                };

                let size = if metadata.is_file() {
                    format_size(metadata.len())
                } else {
                    "-".to_string()
                };

                let modified = metadata
                    .modified()
                    .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|_| "-".to_string());

                keep_first(
                    &mut kept,
                    format!("{:4}  {:>10}  {:16}  {}", entry_type, size, modified, name),
                    cap,
                );
            } else if metadata.is_dir() {
                dir_count += 1;
                keep_first(&mut kept, format!("{}/", name), cap);
            } else {
                file_count += 1;
                keep_first(&mut kept, name.to_string(), cap);
            }
            total += 1;
        }

        let result_lines = kept.into_sorted_vec();
        let shown = result_lines.len();

        // Build response
        let mut response = format!("Directory: {}\n", params.path);
        if params.detailed {
            response.push_str("\nType  Size        Modified          Name\n");
            response.push_str("----  ----------  ----------------  ----\n");
        }
        response.push_str(&result_lines.join("\n"));
        response.push_str(&format!(
            "\n\nTotal: {} directories, {} files",
            dir_count, file_count
        ));
        if shown < total {
            response.push_str(&format!(" (showing first {} of {} entries)", shown, total));
        }

        info!("Listed {} entries in {}", shown, params.path);

        Ok(ToolOutput::Text(response))
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn entry_limit(requested: Option<u32>) -> usize {
    requested.map_or(DEFAULT_LIMIT, |l| l as usize).min(MAX_LIMIT)
}

/// Keep the `cap` smallest lines seen so far.
fn keep_first(kept: &mut BinaryHeap<String>, line: String, cap: usize) {
    if kept.len() < cap {
        kept.push(line);
    } else if kept.peek().is_some_and(|largest| *largest > line) {
        kept.pop();
        kept.push(line);
    }
}

/// Format file size in human-readable format.
pub(crate) fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", size as u64, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn tool() -> ListDirTool {
        ListDirTool::new(Arc::new(Config::default()))
    }

    fn ctx() -> InvocationContext {
        InvocationContext::standalone(ListDirTool::NAME, Duration::from_secs(5))
    }

    fn params(path: &std::path::Path) -> ListDirParams {
        ListDirParams {
            path: path.to_string_lossy().to_string(),
            include_hidden: false,
            detailed: false,
            limit: None,
        }
    }

    fn text(output: ToolOutput) -> String {
        match output {
            ToolOutput::Text(text) => text,
            other => panic!("Expected text content, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_dir_execute() {
        // Create a temporary directory with test files
        let temp_dir = TempDir::new().unwrap();
        let temp_path = temp_dir.path();

        fs::write(temp_path.join("file1.txt"), "content").unwrap();
        fs::write(temp_path.join("file2.txt"), "content").unwrap();
        fs::write(temp_path.join(".hidden"), "content").unwrap();
        fs::create_dir(temp_path.join("subdir")).unwrap();

        let text = text(tool().execute(params(temp_path), &ctx()).await.unwrap());

        assert!(text.contains("file1.txt"));
        assert!(text.contains("file2.txt"));
        assert!(text.contains("subdir/"));
        assert!(!text.contains(".hidden"));
        assert!(text.contains("Total: 1 directories, 2 files"));
    }

    #[tokio::test]
    async fn test_list_dir_nonexistent() {
        let result = tool()
            .execute(params(std::path::Path::new("/nonexistent/path/12345")), &ctx())
            .await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn test_list_dir_detailed() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("test.txt"), "hello world").unwrap();

        let mut p = params(temp_dir.path());
        p.detailed = true;
        let text = text(tool().execute(p, &ctx()).await.unwrap());

        assert!(text.contains("FILE"));
        assert!(text.contains("11 B"));
        assert!(text.contains("test.txt"));
    }

    #[tokio::test]
    async fn test_list_dir_limit() {
        let temp_dir = TempDir::new().unwrap();
        for i in 0..5 {
            fs::write(temp_dir.path().join(format!("f{}.txt", i)), "x").unwrap();
        }

        let mut p = params(temp_dir.path());
        p.limit = Some(2);
        let text = text(tool().execute(p, &ctx()).await.unwrap());

        assert!(text.contains("f0.txt"));
        assert!(text.contains("f1.txt"));
        assert!(!text.contains("f4.txt"));
        assert!(text.contains("showing first 2 of 5 entries"));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(500), "500 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(1048576), "1.0 MB");
        assert_eq!(format_size(1073741824), "1.0 GB");
    }

    #[test]
    fn test_entry_limit() {
        assert_eq!(entry_limit(None), DEFAULT_LIMIT);
        assert_eq!(entry_limit(Some(3)), 3);
        assert_eq!(entry_limit(Some(u32::MAX)), MAX_LIMIT);
    }

    #[test]
    fn test_keep_first_is_bounded() {
        let mut kept = BinaryHeap::new();
        for name in ["e", "b", "d", "a", "c"] {
            keep_first(&mut kept, name.to_string(), 2);
            assert!(kept.len() <= 2);
        }
        assert_eq!(kept.into_sorted_vec(), vec!["a", "b"]);

        let mut none = BinaryHeap::new();
        keep_first(&mut none, "a".to_string(), 0);
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_list_dir_default_cap() {
        let temp_dir = TempDir::new().unwrap();
        for i in 0..DEFAULT_LIMIT + 5 {
            fs::write(temp_dir.path().join(format!("f{:05}.txt", i)), "").unwrap();
        }

        let text = text(tool().execute(params(temp_dir.path()), &ctx()).await.unwrap());

        assert!(text.contains("f00000.txt"));
        assert!(!text.contains(&format!("f{:05}.txt", DEFAULT_LIMIT)));
        assert!(text.contains(&format!(
            "showing first {} of {} entries",
            DEFAULT_LIMIT,
            DEFAULT_LIMIT + 5
        )));
    }
}
