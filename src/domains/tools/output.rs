//! Tool results and the size ceiling applied to them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{ToolError, ToolResult};

/// What a handler returns on success.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Text(String),
    Json(Value),
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Serialize a structured result.
    pub fn json<T: Serialize>(value: &T) -> ToolResult<Self> {
        serde_json::to_value(value)
            .map(Self::Json)
            .map_err(|e| ToolError::internal(format!("failed to serialize result: {}", e)))
    }
}

/// Body of a `call_tool` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text { text: String },
    Json { value: Value },
}

/// The `result` member of a successful `call_tool` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(flatten)]
    pub content: ToolContent,

    /// Set when the engine cut the text down to the ceiling.
    pub truncated: bool,

    /// Size before truncation, only present when truncated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_bytes: Option<usize>,
}

impl CallToolResult {
    /// Wrap handler output, enforcing the result ceiling.
    ///
    /// Structured values that serialize larger than the ceiling are turned
    /// into truncated text of their serialization.
    pub fn from_output(output: ToolOutput, max_bytes: usize) -> Self {
        let text = match output {
            ToolOutput::Text(text) => text,
            ToolOutput::Json(value) => {
                let serialized = serde_json::to_string(&value).unwrap_or_default();
                if serialized.len() <= max_bytes {
                    return Self {
                        content: ToolContent::Json { value },
                        truncated: false,
                        original_bytes: None,
                    };
                }
                serialized
            }
        };

        if text.len() <= max_bytes {
            return Self {
                content: ToolContent::Text { text },
                truncated: false,
                original_bytes: None,
            };
        }

        let original = text.len();
        Self {
            content: ToolContent::Text {
                text: truncate_utf8(&text, max_bytes).to_string(),
            },
            truncated: true,
            original_bytes: Some(original),
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.content {
            ToolContent::Text { text } => Some(text),
            ToolContent::Json { .. } => None,
        }
    }
}

/// Longest prefix of `text` that fits in `max_bytes` without splitting a char.
pub fn truncate_utf8(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut cut = max_bytes;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    &text[..cut]
}

/// Decode bytes as UTF-8, tolerating a character split at the end when the
/// data was cut there. Hands the bytes back when they are not text.
pub(crate) fn decode_utf8(bytes: Vec<u8>, truncated: bool) -> Result<String, Vec<u8>> {
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(e) => {
            let error = e.utf8_error();
            // An incomplete sequence at the very end is only acceptable when
            // the reader stopped there itself.
            if truncated && error.error_len().is_none() {
                let valid = error.valid_up_to();
                let mut bytes = e.into_bytes();
                bytes.truncate(valid);
                String::from_utf8(bytes).map_err(|e| e.into_bytes())
            } else {
                Err(e.into_bytes())
            }
        }
    }
}
