//! Tool Registry - the fixed catalog of tools.
//!
//! The registry is assembled once at startup through [`ToolRegistryBuilder`]
//! and is read-only afterwards, so it is shared between dispatch tasks
//! without locking. Lookup is by name; listing follows registration order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

use super::handlers::{Tool, ToolHandler};
use crate::core::config::{Config, DispatchConfig, ToolCategory};

use super::definitions::{
    CpuInfoTool, DiskUsageTool, ListDirTool, MemoryInfoTool, ProcessListTool, ReadFileTool,
    SearchFilesTool, SshExecTool, WriteFileTool,
};
#[cfg(feature = "net-tools")]
use super::definitions::{HttpGetTool, HttpPostTool};

/// Errors raised while building the catalog.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Tool '{0}' is registered more than once")]
    DuplicateTool(String),

    #[error("Invalid tool name: {0:?}")]
    InvalidName(String),
}

/// Static metadata describing one tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub category: ToolCategory,
    pub input_schema: Value,
    pub timeout: Duration,
}

impl ToolDescriptor {
    /// Wire form used by `list_tools`.
    pub fn to_value(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "category": self.category.as_str(),
            "inputSchema": self.input_schema,
            "timeoutMs": self.timeout.as_millis() as u64,
        })
    }
}

/// A descriptor together with its handler.
#[derive(Clone)]
pub struct RegisteredTool {
    pub descriptor: ToolDescriptor,
    pub handler: Arc<dyn ToolHandler>,
}

/// Tool registry - maps names to registered tools.
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Start a registry whose timeouts come from `dispatch`.
    pub fn builder(dispatch: &DispatchConfig) -> ToolRegistryBuilder {
        ToolRegistryBuilder {
            dispatch: dispatch.clone(),
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Look up a tool by name.
    pub fn resolve(&self, name: &str) -> Option<&RegisteredTool> {
        self.index.get(name).map(|i| &self.tools[*i])
    }

    /// Descriptors in registration order.
    pub fn list(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.iter().map(|t| &t.descriptor)
    }

    /// Get all tool names.
    pub fn tool_names(&self) -> Vec<&str> {
        self.list().map(|d| d.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Startup-time builder for [`ToolRegistry`].
pub struct ToolRegistryBuilder {
    dispatch: DispatchConfig,
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistryBuilder {
    /// Register a typed tool.
    pub fn register<T: Tool>(self, tool: T) -> Result<Self, RegistryError> {
        self.register_handler(Arc::new(tool))
    }

    /// Register an already type-erased handler.
    pub fn register_handler(mut self, handler: Arc<dyn ToolHandler>) -> Result<Self, RegistryError> {
        let name = handler.name().to_string();
        if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(RegistryError::InvalidName(name));
        }
        if self.index.contains_key(&name) {
            return Err(RegistryError::DuplicateTool(name));
        }

        let category = handler.category();
        let descriptor = ToolDescriptor {
            timeout: self.dispatch.timeout_for(&name, category),
            description: handler.description().to_string(),
            input_schema: handler.input_schema(),
            category,
            name: name.clone(),
        };
        debug!(tool = %name, timeout = ?descriptor.timeout, "Registered tool");

        self.index.insert(name, self.tools.len());
        self.tools.push(RegisteredTool { descriptor, handler });
        Ok(self)
    }

    pub fn build(self) -> ToolRegistry {
        ToolRegistry {
            tools: self.tools,
            index: self.index,
        }
    }
}

/// Build the compiled-in catalog.
pub fn build_tool_registry(config: Arc<Config>) -> Result<ToolRegistry, RegistryError> {
    let builder = ToolRegistry::builder(&config.dispatch)
        .register(ReadFileTool::new(config.clone()))?
        .register(WriteFileTool::new(config.clone()))?
        .register(ListDirTool::new(config.clone()))?
        .register(SearchFilesTool::new(config.clone()))?
        .register(DiskUsageTool::new(config.clone()))?
        .register(MemoryInfoTool)?
        .register(CpuInfoTool)?
        .register(ProcessListTool)?
        .register(SshExecTool::new(config.clone()))?;

    #[cfg(feature = "net-tools")]
    let builder = builder
        .register(HttpGetTool::new(config.clone()))?
        .register(HttpPostTool::new(config))?;

    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Arc<Config> {
        Arc::new(Config::default())
    }

    #[test]
    fn test_registry_tool_names() {
        let registry = build_tool_registry(test_config()).unwrap();
        let names = registry.tool_names();
        for expected in [
            "read_file",
            "write_file",
            "list_dir",
            "search_files",
            "disk_usage",
            "memory_info",
            "cpu_info",
            "process_list",
            "ssh_exec",
        ] {
            assert!(names.contains(&expected), "missing {}", expected);
        }
        #[cfg(feature = "net-tools")]
        {
            assert!(names.contains(&"http_get"));
            assert!(names.contains(&"http_post"));
        }
    }

    #[test]
    fn test_list_is_insertion_ordered() {
        let registry = build_tool_registry(test_config()).unwrap();
        let names = registry.tool_names();
        assert_eq!(&names[..3], &["read_file", "write_file", "list_dir"]);
    }

    #[test]
    fn test_resolve() {
        let registry = build_tool_registry(test_config()).unwrap();
        let tool = registry.resolve("read_file").unwrap();
        assert_eq!(tool.descriptor.category, ToolCategory::Filesystem);
        assert_eq!(tool.descriptor.timeout, Duration::from_secs(10));
        assert!(registry.resolve("unknown").is_none());
    }

    #[test]
    fn test_duplicate_rejected() {
        let config = test_config();
        let result = ToolRegistry::builder(&config.dispatch)
            .register(MemoryInfoTool)
            .and_then(|b| b.register(MemoryInfoTool));
        assert!(matches!(result, Err(RegistryError::DuplicateTool(name)) if name == "memory_info"));
    }

    #[test]
    fn test_timeout_override_applies() {
        let mut config = Config::default();
        config
            .dispatch
            .tool_timeouts
            .insert("ssh_exec".to_string(), Duration::from_secs(300));
        let registry = build_tool_registry(Arc::new(config)).unwrap();
        assert_eq!(
            registry.resolve("ssh_exec").unwrap().descriptor.timeout,
            Duration::from_secs(300)
        );
    }

    #[test]
    fn test_descriptor_wire_form() {
        let registry = build_tool_registry(test_config()).unwrap();
        let value = registry.resolve("read_file").unwrap().descriptor.to_value();
        assert_eq!(value["name"], "read_file");
        assert_eq!(value["category"], "filesystem");
        assert_eq!(value["timeoutMs"], 10_000);
        assert_eq!(value["inputSchema"]["required"], json!(["path"]));
    }
}
