//! Tools domain module.
//!
//! Tools are the capabilities clients invoke through `call_tool`.
//!
//! ## Architecture
//!
//! - `definitions/` - Individual tool implementations (one file per tool)
//! - `handlers.rs` - The `Tool` contract and the per-call `InvocationContext`
//! - `registry.rs` - The fixed catalog, built once at startup
//! - `schema.rs` - Argument schemas and validation
//! - `output.rs` - Tool results and the result size ceiling
//! - `process.rs` - Subprocess runner that kills children on cancel
//! - `error.rs` - Tool-specific error types
//!
//! ## Adding a New Tool
//!
//! 1. Create a new file in `definitions/` implementing [`Tool`]
//! 2. Export it in `definitions/mod.rs`
//! 3. Register it in `build_tool_registry`

pub mod definitions;
mod error;
mod handlers;
mod output;
pub mod process;
mod registry;
pub mod schema;

pub use error::{ToolError, ToolResult};
pub use handlers::{InvocationContext, Tool, ToolFuture, ToolHandler};
pub use output::{CallToolResult, ToolContent, ToolOutput, truncate_utf8};
pub use registry::{RegisteredTool, RegistryError, ToolDescriptor, ToolRegistry, ToolRegistryBuilder, build_tool_registry};
