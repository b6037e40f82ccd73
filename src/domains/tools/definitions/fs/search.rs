//! Search files tool definition.
//!
//! Walks a directory tree and reports entries whose file name matches a glob
//! pattern, optionally restricted to files containing a substring.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::core::config::{Config, ToolCategory};
use crate::core::security::validate_path;
use crate::domains::tools::error::{ToolError, ToolResult};
use crate::domains::tools::handlers::{InvocationContext, Tool};
use crate::domains::tools::output::ToolOutput;

const DEFAULT_MAX_RESULTS: usize = 200;
const DEFAULT_MAX_DEPTH: usize = 10;

/// Files larger than this are not scanned for `contains`.
const MAX_SCAN_BYTES: u64 = 4 * 1024 * 1024;

// ============================================================================
// Tool Parameters
// ============================================================================

/// Parameters for the search files tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchFilesParams {
    /// Directory to search from.
    pub path: String,

    /// Glob pattern matched against file names, e.g. "*.log".
    pub pattern: String,

    /// Only report files whose content contains this text.
    #[serde(default)]
    pub contains: Option<String>,

    /// Maximum number of matches to return (default 200).
    #[serde(default)]
    pub max_results: Option<u32>,

    /// Maximum directory depth to descend (default 10).
    #[serde(default)]
    pub max_depth: Option<u32>,
}

#[derive(Debug, Serialize)]
struct SearchReport {
    root: String,
    pattern: String,
    matches: Vec<String>,
    scanned: usize,
    truncated: bool,
}

// ============================================================================
// Tool Definition
// ============================================================================

/// Search files tool - finds files by name and optionally by content.
pub struct SearchFilesTool {
    config: Arc<Config>,
}

impl SearchFilesTool {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Tool for SearchFilesTool {
    type Params = SearchFilesParams;

    const NAME: &'static str = "search_files";

    const DESCRIPTION: &'static str = "Recursively search a directory for files whose name matches a glob pattern, optionally filtering by text content. Returns paths relative to the search root.";

    const CATEGORY: ToolCategory = ToolCategory::Filesystem;

    #[instrument(skip_all, fields(path = %params.path, pattern = %params.pattern))]
    async fn execute(&self, params: SearchFilesParams, ctx: &InvocationContext) -> ToolResult<ToolOutput> {
        info!("Search files tool called in {} for {}", params.path, params.pattern);

        let root = validate_path(&params.path, &self.config.security).inspect_err(|e| {
            warn!("Path security validation failed: {}", e);
        })?;
        if !root.is_dir() {
            return Err(ToolError::invalid_arguments(format!(
                "Path is not a directory: {}",
                params.path
            )));
        }

        let pattern = glob::Pattern::new(&params.pattern).map_err(|e| {
            ToolError::invalid_arguments(format!("Invalid glob pattern '{}': {}", params.pattern, e))
        })?;

        let search = Search {
            root,
            pattern,
            contains: params.contains.filter(|c| !c.is_empty()),
            max_results: params.max_results.map_or(DEFAULT_MAX_RESULTS, |n| n as usize),
            max_depth: params.max_depth.map_or(DEFAULT_MAX_DEPTH, |n| n as usize),
        };

        let cancel = ctx.cancellation_token().clone();
        let (matches, scanned, truncated) = tokio::task::spawn_blocking(move || search.run(&cancel))
            .await
            .map_err(|e| ToolError::internal(format!("search task failed: {}", e)))??;

        info!("Found {} matches after scanning {} entries", matches.len(), scanned);

        ToolOutput::json(&SearchReport {
            root: params.path,
            pattern: params.pattern,
            matches,
            scanned,
            truncated,
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

struct Search {
    root: PathBuf,
    pattern: glob::Pattern,
    contains: Option<String>,
    max_results: usize,
    max_depth: usize,
}

impl Search {
    /// Blocking walk; stops early when `cancel` fires.
    fn run(&self, cancel: &CancellationToken) -> ToolResult<(Vec<String>, usize, bool)> {
        let mut matches = Vec::new();
        let mut scanned = 0;

        let walker = WalkDir::new(&self.root)
            .max_depth(self.max_depth)
            .follow_links(false)
            .sort_by_file_name();

        for entry in walker {
            if cancel.is_cancelled() {
                return Err(ToolError::Cancelled);
            }

            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if entry.depth() == 0 {
                continue;
            }
            scanned += 1;

            let name = entry.file_name().to_string_lossy();
            if !self.pattern.matches(&name) {
                continue;
            }
            if let Some(needle) = &self.contains {
                if !entry.file_type().is_file() || !file_contains(entry.path(), needle) {
                    continue;
                }
            }

            if matches.len() == self.max_results {
                return Ok((matches, scanned, true));
            }
            matches.push(relative_display(&self.root, entry.path()));
        }

        Ok((matches, scanned, false))
    }
}

fn file_contains(path: &Path, needle: &str) -> bool {
    match std::fs::metadata(path) {
        Ok(m) if m.len() <= MAX_SCAN_BYTES => {}
        _ => return false,
    }
    match std::fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).contains(needle),
        Err(e) => {
            debug!("Cannot read {}: {}", path.display(), e);
            false
        }
    }
}

fn relative_display(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

// ============================================================================
// Tests
// ============================================================================
