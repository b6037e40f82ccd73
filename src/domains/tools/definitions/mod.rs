//! Tool definitions module.
//!
//! This module exports all available tool definitions.
//! Each tool is defined in its own file for better maintainability.

pub mod fs;
#[cfg(feature = "net-tools")]
pub mod http;
pub mod remote;
pub mod system;

pub use fs::{ListDirTool, ReadFileTool, SearchFilesTool, WriteFileTool};
#[cfg(feature = "net-tools")]
pub use http::{HttpGetTool, HttpPostTool};
pub use remote::SshExecTool;
pub use system::{CpuInfoTool, DiskUsageTool, MemoryInfoTool, ProcessListTool};
