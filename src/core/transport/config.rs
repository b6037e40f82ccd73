//! Transport configuration types.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default cap on one incoming frame.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Default capacity of the outbound response queue.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 64;

/// How frames are delimited on stdin/stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Framing {
    /// One JSON document per line.
    #[default]
    Line,

    /// `Content-Length: N` header block followed by an N byte body.
    ContentLength,
}

impl Framing {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "line" | "lines" | "ndjson" => Some(Self::Line),
            "content-length" | "length" | "lsp" => Some(Self::ContentLength),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Line => "line",
            Self::ContentLength => "content-length",
        }
    }
}

/// Transport configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Frame delimiting mode.
    pub framing: Framing,

    /// Largest accepted incoming frame, in bytes.
    pub max_frame_bytes: usize,

    /// Responses queued for the writer before dispatch tasks wait.
    pub outbound_buffer: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            framing: Framing::Line,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
        }
    }
}

impl TransportConfig {
    /// Create a line-delimited config with default limits.
    pub fn line() -> Self {
        Self::default()
    }

    /// Create a `Content-Length` framed config with default limits.
    pub fn content_length() -> Self {
        Self {
            framing: Framing::ContentLength,
            ..Self::default()
        }
    }

    /// Load transport config from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(framing) = std::env::var("MCP_FRAMING") {
            match Framing::parse(&framing) {
                Some(framing) => config.framing = framing,
                None => warn!("Ignoring unknown MCP_FRAMING value: {}", framing),
            }
        }

        if let Some(bytes) = parse_positive("MCP_MAX_FRAME_BYTES") {
            config.max_frame_bytes = bytes;
        }

        if let Some(buffer) = parse_positive("MCP_OUTBOUND_BUFFER") {
            config.outbound_buffer = buffer;
        }

        config
    }

    /// Get a description of this transport for logging.
    pub fn description(&self) -> String {
        format!(
            "STDIO ({} framing, max frame {} bytes)",
            self.framing.as_str(),
            self.max_frame_bytes
        )
    }
}

fn parse_positive(key: &str) -> Option<usize> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            warn!("Ignoring invalid {} value: {}", key, raw);
            None
        }
    }
}
