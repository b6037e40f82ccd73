//! Tool Server Entry Point
//!
//! Starts the diagnostic channel, loads configuration, builds the tool
//! catalog and serves the host over stdin/stdout until stdin closes.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use ops_tool_server::core::config::LoggingConfig;
use ops_tool_server::core::{Config, StdioTransport, ToolServer, diagnostics};
use ops_tool_server::domains::tools::build_tool_registry;

#[tokio::main]
async fn main() -> Result<()> {
    // Diagnostics first, so configuration problems are reported
    let sink = diagnostics::init(&LoggingConfig::from_env())?;

    // Load configuration from environment
    let config = Arc::new(Config::from_env());

    info!("Starting {} v{}", config.server.name, config.server.version);
    info!("Diagnostics: {}", sink.description());

    let registry = build_tool_registry(config.clone())?;
    info!("Server initialized with {} tools", registry.len());

    let server = Arc::new(ToolServer::new(config.clone(), registry));
    if let Err(e) = StdioTransport::run(server, &config.transport).await {
        error!("Fatal transport error, exiting: {}", e);
        // A blocking stdin read still in flight would keep the runtime from
        // shutting down until the host closes its end.
        std::process::exit(1);
    }

    info!("Server shutting down");

    Ok(())
}
