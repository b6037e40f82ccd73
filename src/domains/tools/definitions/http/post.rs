//! HTTP POST tool definition.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, instrument};

use super::client::{HttpClient, header_map, parse_url};
use crate::core::config::{Config, ToolCategory};
use crate::domains::tools::error::{ToolError, ToolResult};
use crate::domains::tools::handlers::{InvocationContext, Tool};
use crate::domains::tools::output::ToolOutput;

// ============================================================================
// Tool Parameters
// ============================================================================

/// Parameters for the HTTP POST tool. At most one of `json`, `form` and
/// `body` may be given.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct HttpPostParams {
    /// http:// or https:// URL to post to.
    pub url: String,

    /// Extra request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// JSON request body.
    #[serde(default)]
    pub json: Option<Value>,

    /// Form fields, sent url-encoded.
    #[serde(default)]
    pub form: Option<BTreeMap<String, String>>,

    /// Raw text body.
    #[serde(default)]
    pub body: Option<String>,
}

// ============================================================================
// Tool Definition
// ============================================================================

/// HTTP POST tool - sends a body to a URL and returns the response.
pub struct HttpPostTool {
    http: HttpClient,
}

impl HttpPostTool {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            http: HttpClient::new(config.http.clone()),
        }
    }
}

#[async_trait]
impl Tool for HttpPostTool {
    type Params = HttpPostParams;

    const NAME: &'static str = "http_post";

    const DESCRIPTION: &'static str = "Send an HTTP POST with a JSON, form or raw body and return the status code, selected headers and the (size-limited) body.";

    const CATEGORY: ToolCategory = ToolCategory::Network;

    #[instrument(skip_all)]
    async fn execute(&self, params: HttpPostParams, ctx: &InvocationContext) -> ToolResult<ToolOutput> {
        let url = parse_url(&params.url)?;
        info!("HTTP POST tool called for host: {}", url.host_str().unwrap_or("-"));

        let bodies = [params.json.is_some(), params.form.is_some(), params.body.is_some()];
        if bodies.iter().filter(|given| **given).count() > 1 {
            return Err(ToolError::invalid_arguments(
                "Only one of 'json', 'form' and 'body' may be given",
            ));
        }

        let mut request = self
            .http
            .client()
            .await?
            .post(url)
            .headers(header_map(&params.headers)?);

        if let Some(json) = &params.json {
            request = request.json(json);
        } else if let Some(form) = &params.form {
            let encoded = serde_urlencoded::to_string(form)
                .map_err(|e| ToolError::invalid_arguments(format!("Invalid form: {}", e)))?;
            request = request
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(encoded);
        } else if let Some(body) = params.body {
            request = request.body(body);
        }

        let summary = self.http.execute(request, ctx).await?;
        ToolOutput::json(&summary)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::tools::definitions::http::client::test_server::serve_once;
    use serde_json::json;
    use std::time::Duration;

    fn ctx() -> InvocationContext {
        InvocationContext::standalone(HttpPostTool::NAME, Duration::from_secs(10))
    }

    fn params(url: String) -> HttpPostParams {
        HttpPostParams {
            url,
            headers: BTreeMap::new(),
            json: None,
            form: None,
            body: None,
        }
    }

    #[tokio::test]
    async fn test_post_json() {
        let (base, request) = serve_once("application/json", br#"{"ok":true}"#.to_vec()).await;
        let mut p = params(format!("{}/hook", base));
        p.json = Some(json!({ "event": "deploy" }));

        let output = HttpPostTool::new(Arc::new(Config::default()))
            .execute(p, &ctx())
            .await
            .unwrap();
        let ToolOutput::Json(value) = output else {
            panic!("Expected JSON output");
        };
        assert_eq!(value["status"], 200);
        assert_eq!(value["body"], r#"{"ok":true}"#);

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /hook HTTP/1.1"));
        assert!(request.to_lowercase().contains("content-type: application/json"));
        assert!(request.ends_with(r#"{"event":"deploy"}"#));
    }

    #[tokio::test]
    async fn test_post_form() {
        let (base, request) = serve_once("text/plain", b"ok".to_vec()).await;
        let mut p = params(base);
        let mut form = BTreeMap::new();
        form.insert("name".to_string(), "web 1".to_string());
        p.form = Some(form);

        HttpPostTool::new(Arc::new(Config::default()))
            .execute(p, &ctx())
            .await
            .unwrap();

        let request = request.await.unwrap();
        assert!(request.to_lowercase().contains("content-type: application/x-www-form-urlencoded"));
        assert!(request.ends_with("name=web+1"));
    }

    #[tokio::test]
    async fn test_post_rejects_multiple_bodies() {
        let mut p = params("http://127.0.0.1:9/".to_string());
        p.json = Some(json!({}));
        p.body = Some("raw".to_string());

        let result = HttpPostTool::new(Arc::new(Config::default()))
            .execute(p, &ctx())
            .await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }
}
