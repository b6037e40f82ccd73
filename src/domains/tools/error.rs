//! Tool-specific error types.

use std::time::Duration;

use thiserror::Error;

use crate::core::security::PathSecurityError;

/// Result type returned by tool handlers.
pub type ToolResult<T> = Result<T, ToolError>;

/// Errors that can occur during tool operations.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Invalid arguments were provided to the tool.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The tool execution failed.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// The tool gave up because its deadline passed.
    #[error("Tool execution timed out after {0:?}")]
    Timeout(Duration),

    /// The call was cancelled before it completed.
    #[error("Tool execution cancelled")]
    Cancelled,

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ToolError {
    /// Create a new "invalid arguments" error.
    pub fn invalid_arguments(msg: impl Into<String>) -> Self {
        Self::InvalidArguments(msg.into())
    }

    /// Create a new "execution failed" error.
    pub fn execution_failed(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed(msg.into())
    }

    /// Create a new "internal" error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<PathSecurityError> for ToolError {
    fn from(err: PathSecurityError) -> Self {
        Self::InvalidArguments(format!("Path security validation failed: {}", err))
    }
}

impl From<std::io::Error> for ToolError {
    fn from(err: std::io::Error) -> Self {
        Self::ExecutionFailed(err.to_string())
    }
}
