//! Operational tool server library.
//!
//! A host process (typically an AI agent runtime) launches the server and
//! talks to it over stdin/stdout: it lists the available tools and invokes
//! them, many at once, with per-call time budgets and cancellation.
//!
//! # Architecture
//!
//! - **core**: Configuration, diagnostics, the wire protocol, the dispatch
//!   engine ([`ToolServer`]) and the transport layer
//! - **domains**: Business logic organized by bounded contexts
//!   - **tools**: Filesystem, system metrics, remote command and HTTP tools
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use ops_tool_server::core::{Config, StdioTransport, ToolServer};
//! use ops_tool_server::domains::tools::build_tool_registry;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(Config::from_env());
//!     let registry = build_tool_registry(config.clone())?;
//!     let server = Arc::new(ToolServer::new(config.clone(), registry));
//!     StdioTransport::run(server, &config.transport).await?;
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod domains;

// Re-export commonly used types for convenience
pub use core::{Config, Error, Result, ToolServer};
