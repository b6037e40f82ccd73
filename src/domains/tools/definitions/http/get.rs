//! HTTP GET tool definition.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{info, instrument};

use super::client::{HttpClient, header_map, parse_url, with_query};
use crate::core::config::{Config, ToolCategory};
use crate::domains::tools::error::ToolResult;
use crate::domains::tools::handlers::{InvocationContext, Tool};
use crate::domains::tools::output::ToolOutput;

// ============================================================================
// Tool Parameters
// ============================================================================

/// Parameters for the HTTP GET tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct HttpGetParams {
    /// http:// or https:// URL to fetch.
    pub url: String,

    /// Extra request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Query parameters appended to the URL.
    #[serde(default)]
    pub query: BTreeMap<String, String>,
}

// ============================================================================
// Tool Definition
// ============================================================================

/// HTTP GET tool - fetches a URL and returns status, headers and body.
pub struct HttpGetTool {
    http: HttpClient,
}

impl HttpGetTool {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            http: HttpClient::new(config.http.clone()),
        }
    }
}

#[async_trait]
impl Tool for HttpGetTool {
    type Params = HttpGetParams;

    const NAME: &'static str = "http_get";

    const DESCRIPTION: &'static str = "Fetch a URL with HTTP GET and return the status code, selected headers and the (size-limited) body.";

    const CATEGORY: ToolCategory = ToolCategory::Network;

    #[instrument(skip_all)]
    async fn execute(&self, params: HttpGetParams, ctx: &InvocationContext) -> ToolResult<ToolOutput> {
        let url = with_query(parse_url(&params.url)?, &params.query)?;
        info!("HTTP GET tool called for host: {}", url.host_str().unwrap_or("-"));

        let request = self
            .http
            .client()
            .await?
            .get(url)
            .headers(header_map(&params.headers)?);

        let summary = self.http.execute(request, ctx).await?;
        ToolOutput::json(&summary)
    }
}

// ============================================================================
// Tests
// ============================================================================
