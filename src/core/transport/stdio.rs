//! STDIO transport implementation.
//!
//! The host talks to the server over its stdin and stdout; stdout carries
//! nothing but protocol frames.

use std::sync::Arc;

use tracing::info;

use super::session::serve;
use super::{TransportConfig, TransportResult};
use crate::core::server::ToolServer;

/// STDIO transport handler.
pub struct StdioTransport;

impl StdioTransport {
    /// Serve requests from stdin until it closes.
    pub async fn run(server: Arc<ToolServer>, config: &TransportConfig) -> TransportResult<()> {
        info!("Ready - communicating via {}", config.description());

        serve(server, tokio::io::stdin(), tokio::io::stdout(), config).await?;

        info!("STDIO transport finished");
        Ok(())
    }
}
