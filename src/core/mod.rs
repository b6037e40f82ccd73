//! Core module containing shared infrastructure components.
//!
//! This module provides the foundational building blocks for the tool server:
//! configuration, diagnostics, error handling, the wire protocol, the
//! dispatch engine and the transport layer.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod protocol;
pub mod sanitize;
pub mod security;
pub mod server;
pub mod transport;

pub use config::{Config, DispatchConfig, ToolCategory};
pub use error::{Error, Result};
pub use protocol::{ErrorCode, Request, RequestId, Response};
pub use security::{PathSecurityError, validate_path};
pub use server::ToolServer;
pub use transport::{StdioTransport, TransportConfig};
