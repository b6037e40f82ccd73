//! Shared plumbing for the HTTP tools.
//!
//! One lazily built `reqwest` client per tool, URL and header validation,
//! and a body reader that stops at the configured size and honours
//! cancellation between chunks.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::core::config::HttpToolConfig;
use crate::domains::tools::error::{ToolError, ToolResult};
use crate::domains::tools::handlers::InvocationContext;
use crate::domains::tools::output::decode_utf8;

/// Response headers worth reporting back.
const REPORTED_HEADERS: &[&str] = &[
    "content-type",
    "content-length",
    "content-encoding",
    "location",
    "last-modified",
    "etag",
];

/// What an HTTP tool returns.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponseSummary {
    pub status: u16,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// Body as text when it is valid UTF-8.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Body as base64 otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_base64: Option<String>,
    pub body_bytes: usize,
    pub truncated: bool,
}

pub struct HttpClient {
    config: HttpToolConfig,
    client: OnceCell<Client>,
}

impl HttpClient {
    pub fn new(config: HttpToolConfig) -> Self {
        Self {
            config,
            client: OnceCell::new(),
        }
    }

    pub async fn client(&self) -> ToolResult<&Client> {
        self.client
            .get_or_try_init(|| async {
                Client::builder()
                    .user_agent(self.config.user_agent.clone())
                    .build()
                    .map_err(|e| ToolError::internal(format!("Failed to create HTTP client: {}", e)))
            })
            .await
    }

    /// Send the request and read at most `max_body_bytes` of the body.
    pub async fn execute(&self, request: RequestBuilder, ctx: &InvocationContext) -> ToolResult<HttpResponseSummary> {
        let response = tokio::select! {
            result = request.send() => result.map_err(|e| {
                ToolError::execution_failed(format!("HTTP request failed: {}", e.without_url()))
            })?,
            _ = ctx.cancelled() => return Err(ToolError::Cancelled),
        };

        let status = response.status();
        let url = response.url().to_string();
        let headers = reported_headers(response.headers());
        info!("HTTP {} from {}", status.as_u16(), url);

        let (bytes, truncated) = read_body(response, self.config.max_body_bytes, ctx).await?;
        let body_bytes = bytes.len();
        let (body, body_base64) = match decode_utf8(bytes, truncated) {
            Ok(text) => (Some(text), None),
            Err(bytes) => (None, Some(BASE64.encode(bytes))),
        };

        Ok(HttpResponseSummary {
            status: status.as_u16(),
            url,
            headers,
            body,
            body_base64,
            body_bytes,
            truncated,
        })
    }
}

/// Parse a URL, accepting only `http` and `https`.
pub fn parse_url(raw: &str) -> ToolResult<Url> {
    let url = Url::parse(raw).map_err(|e| ToolError::invalid_arguments(format!("Invalid URL '{}': {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ToolError::invalid_arguments(format!(
            "Unsupported URL scheme '{}': only http and https are allowed",
            other
        ))),
    }
}

/// Append url-encoded `query` pairs to `url`.
pub fn with_query(mut url: Url, query: &BTreeMap<String, String>) -> ToolResult<Url> {
    if query.is_empty() {
        return Ok(url);
    }
    let encoded = serde_urlencoded::to_string(query)
        .map_err(|e| ToolError::invalid_arguments(format!("Invalid query: {}", e)))?;
    let combined = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{}&{}", existing, encoded),
        _ => encoded,
    };
    url.set_query(Some(&combined));
    Ok(url)
}

/// Convert caller-supplied headers.
pub fn header_map(headers: &BTreeMap<String, String>) -> ToolResult<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ToolError::invalid_arguments(format!("Invalid header name '{}'", name)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| ToolError::invalid_arguments(format!("Invalid value for header '{}'", name)))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn reported_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    REPORTED_HEADERS
        .iter()
        .filter_map(|name| {
            let value = headers.get(*name)?.to_str().ok()?;
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

async fn read_body(mut response: Response, limit: usize, ctx: &InvocationContext) -> ToolResult<(Vec<u8>, bool)> {
    let mut body = Vec::new();

    loop {
        let chunk = tokio::select! {
            chunk = response.chunk() => chunk.map_err(|e| {
                ToolError::execution_failed(format!("Failed to read response body: {}", e.without_url()))
            })?,
            _ = ctx.cancelled() => return Err(ToolError::Cancelled),
        };
        let Some(chunk) = chunk else {
            return Ok((body, false));
        };

        let room = limit - body.len();
        if chunk.len() > room {
            body.extend_from_slice(&chunk[..room]);
            debug!("Response body cut off at {} bytes", limit);
            return Ok((body, true));
        }
        body.extend_from_slice(&chunk);
    }
}

#[cfg(test)]
pub(crate) mod test_server {
    //! Single-shot HTTP/1.1 server for exercising the tools locally.

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Serve one request with `body`; the raw request comes back on the channel.
    pub async fn serve_once(content_type: &'static str, body: Vec<u8>) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                if n == 0 || request_complete(&request) {
                    break;
                }
            }

            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                content_type,
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&body).await.unwrap();
            socket.shutdown().await.unwrap();
            let _ = tx.send(String::from_utf8_lossy(&request).into_owned());
        });

        (format!("http://{}", addr), rx)
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some(split) = text.find("\r\n\r\n") else {
            return false;
        };
        let length = text[..split]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        request.len() >= split + 4 + length
    }
}
