//! Transport error types.

use thiserror::Error;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors that can occur in transport operations.
///
/// Every variant here is fatal for the session: malformed input is not an
/// error at this level, it is reported to the host as a `decode_error`.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Reading the input stream failed.
    #[error("Failed to read input stream: {0}")]
    Read(#[source] std::io::Error),

    /// Writing the output stream failed; no further responses can be delivered.
    #[error("Failed to write output stream: {0}")]
    Write(#[source] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The writer task is gone.
    #[error("Output writer stopped: {0}")]
    WriterStopped(String),

    /// Protocol error while decoding captured output.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a writer-stopped error.
    pub fn writer_stopped(msg: impl Into<String>) -> Self {
        Self::WriterStopped(msg.into())
    }
}
