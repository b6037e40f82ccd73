//! Wire messages exchanged with the host.
//!
//! A request is `{ id, method, params }`. A response is either
//! `{ id, result }` or `{ id, error: { code, message } }`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Version reported by `initialize`.
pub const PROTOCOL_VERSION: &str = "2025-01-01";

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque correlation token chosen by the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl RequestId {
    /// Interpret an arbitrary JSON value as an id, if it is one.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Number),
            Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Protocol operations understood by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Initialize,
    ListTools,
    CallTool,
    Ping,
    Cancel,
    Unknown(String),
}

impl Method {
    pub fn parse(name: &str) -> Self {
        match name {
            "initialize" => Self::Initialize,
            "list_tools" => Self::ListTools,
            "call_tool" => Self::CallTool,
            "ping" => Self::Ping,
            "cancel" => Self::Cancel,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Initialize => "initialize",
            Self::ListTools => "list_tools",
            Self::CallTool => "call_tool",
            Self::Ping => "ping",
            Self::Cancel => "cancel",
            Self::Unknown(name) => name,
        }
    }
}

/// One decoded invocation attempt from the host.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub method: Method,
    pub params: Map<String, Value>,
}

impl Request {
    /// Build a request from a decoded JSON frame.
    ///
    /// On failure the id is returned alongside the reason whenever the frame
    /// carried a usable one, so the error response can still be correlated.
    pub fn from_value(value: Value) -> Result<Self, (Option<RequestId>, String)> {
        let Value::Object(mut frame) = value else {
            return Err((None, "frame is not a JSON object".to_string()));
        };

        let id = match frame.get("id") {
            None => return Err((None, "missing 'id'".to_string())),
            Some(raw) => RequestId::from_value(raw)
                .ok_or_else(|| (None, "'id' must be a string or an integer".to_string()))?,
        };

        let method = match frame.remove("method") {
            Some(Value::String(name)) => Method::parse(&name),
            Some(_) => return Err((Some(id), "'method' must be a string".to_string())),
            None => return Err((Some(id), "missing 'method'".to_string())),
        };

        let params = match frame.remove("params") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => return Err((Some(id), "'params' must be an object".to_string())),
        };

        Ok(Self { id, method, params })
    }

    /// Serialize back to the wire shape (used by hosts and tests).
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "method": self.method.as_str(),
            "params": self.params,
        })
    }
}

/// Parameters of `call_tool`.
#[derive(Debug, Clone, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// Parameters of `cancel`.
#[derive(Debug, Clone, Deserialize)]
pub struct CancelParams {
    pub id: RequestId,
}

// ============================================================================
// Responses
// ============================================================================

/// Closed set of failure categories surfaced to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    DecodeError,
    UnknownMethod,
    UnknownTool,
    InvalidArguments,
    Timeout,
    Cancelled,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DecodeError => "decode_error",
            Self::UnknownMethod => "unknown_method",
            Self::UnknownTool => "unknown_tool",
            Self::InvalidArguments => "invalid_arguments",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure payload returned in place of a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorEnvelope {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Success-or-error body of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Result(Value),
    Error(ErrorEnvelope),
}

/// The single answer emitted for a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: Option<RequestId>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl Response {
    /// Create a success response.
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            id: Some(id),
            outcome: Outcome::Result(result),
        }
    }

    /// Create an error response.
    pub fn error(id: Option<RequestId>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            id,
            outcome: Outcome::Error(ErrorEnvelope::new(code, message)),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match &self.outcome {
            Outcome::Error(envelope) => Some(envelope.code),
            Outcome::Result(_) => None,
        }
    }

    pub fn result(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Result(value) => Some(value),
            Outcome::Error(_) => None,
        }
    }
}
