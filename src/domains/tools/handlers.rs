//! The tool contract.
//!
//! Every capability implements [`Tool`]: a name, a description, a category
//! that sets its time budget, a parameter type whose JSON schema is published
//! by `list_tools`, and an async `execute`. The registry stores tools behind
//! the object-safe [`ToolHandler`], which the blanket impl provides.
//!
//! Handlers must not write to stdout, must report failures as [`ToolError`]
//! instead of panicking or exiting, must watch the context's cancellation
//! signal during long work, and must bound output that is inherently
//! unbounded.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::Span;

use super::error::{ToolError, ToolResult};
use super::output::ToolOutput;
use super::schema;
use crate::core::config::ToolCategory;
use crate::core::protocol::RequestId;

// ============================================================================
// Invocation context
// ============================================================================

/// Per-call state handed to a handler.
///
/// Carries the deadline, the cancellation signal and the diagnostic span of
/// exactly one call.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    request_id: RequestId,
    tool: String,
    deadline: Instant,
    cancel: CancellationToken,
    span: Span,
}

impl InvocationContext {
    pub fn new(
        request_id: RequestId,
        tool: impl Into<String>,
        deadline: Instant,
        cancel: CancellationToken,
        span: Span,
    ) -> Self {
        Self {
            request_id,
            tool: tool.into(),
            deadline,
            cancel,
            span,
        }
    }

    /// Context for running a tool outside the dispatch engine.
    pub fn standalone(tool: impl Into<String>, budget: Duration) -> Self {
        Self::new(
            RequestId::Number(0),
            tool,
            Instant::now() + budget,
            CancellationToken::new(),
            Span::none(),
        )
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn tool_name(&self) -> &str {
        &self.tool
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the call is cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Cooperative checkpoint for long-running loops.
    pub fn checkpoint(&self) -> ToolResult<()> {
        if self.is_cancelled() {
            return Err(ToolError::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(ToolError::Timeout(Duration::ZERO));
        }
        Ok(())
    }
}

// ============================================================================
// Tool traits
// ============================================================================

/// A typed tool definition.
#[async_trait]
pub trait Tool: Send + Sync + 'static {
    /// Arguments accepted by the tool; its schema is what `list_tools` shows.
    type Params: DeserializeOwned + JsonSchema + Send + 'static;

    /// Tool name as registered.
    const NAME: &'static str;

    /// Tool description shown to clients.
    const DESCRIPTION: &'static str;

    /// Class of work, used to pick the time budget.
    const CATEGORY: ToolCategory;

    /// Run the tool with validated parameters.
    async fn execute(&self, params: Self::Params, ctx: &InvocationContext) -> ToolResult<ToolOutput>;
}

/// A bound, ready-to-run tool call.
pub type ToolFuture = BoxFuture<'static, ToolResult<ToolOutput>>;

/// Object-safe view of a tool, as stored in the registry.
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn category(&self) -> ToolCategory;

    /// JSON schema of the arguments.
    fn input_schema(&self) -> Value;

    /// Deserialize the arguments into the tool's parameters.
    ///
    /// Fails with [`ToolError::InvalidArguments`] without touching the tool
    /// body; on success returns the future that runs it.
    fn bind(self: Arc<Self>, arguments: Map<String, Value>, ctx: InvocationContext) -> ToolResult<ToolFuture>;
}

impl<T: Tool> ToolHandler for T {
    fn name(&self) -> &str {
        T::NAME
    }

    fn description(&self) -> &str {
        T::DESCRIPTION
    }

    fn category(&self) -> ToolCategory {
        T::CATEGORY
    }

    fn input_schema(&self) -> Value {
        schema::schema_for::<T::Params>()
    }

    fn bind(self: Arc<Self>, arguments: Map<String, Value>, ctx: InvocationContext) -> ToolResult<ToolFuture> {
        let params: T::Params = serde_json::from_value(Value::Object(arguments))
            .map_err(|e| ToolError::invalid_arguments(e.to_string()))?;

        Ok(async move { self.execute(params, &ctx).await }.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct EchoParams {
        /// Text to echo back.
        message: String,
        #[serde(default)]
        upper: bool,
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        type Params = EchoParams;
        const NAME: &'static str = "echo";
        const DESCRIPTION: &'static str = "Echo a message";
        const CATEGORY: ToolCategory = ToolCategory::System;

        async fn execute(&self, params: EchoParams, _ctx: &InvocationContext) -> ToolResult<ToolOutput> {
            Ok(ToolOutput::text(if params.upper {
                params.message.to_uppercase()
            } else {
                params.message
            }))
        }
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_bind_and_run() {
        let handler: Arc<dyn ToolHandler> = Arc::new(EchoTool);
        let ctx = InvocationContext::standalone("echo", Duration::from_secs(1));
        let future = handler
            .bind(args(json!({ "message": "hi", "upper": true })), ctx)
            .unwrap();
        assert_eq!(future.await.unwrap(), ToolOutput::text("HI"));
    }

    #[test]
    fn test_bind_rejects_bad_params() {
        let handler: Arc<dyn ToolHandler> = Arc::new(EchoTool);
        let ctx = InvocationContext::standalone("echo", Duration::from_secs(1));
        let result = handler.bind(args(json!({ "message": 5 })), ctx);
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[test]
    fn test_schema_lists_required_fields() {
        let schema = EchoTool.input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["message"]));
        assert_eq!(schema["properties"]["message"]["description"], "Text to echo back.");
    }

    #[tokio::test]
    async fn test_checkpoint() {
        let ctx = InvocationContext::standalone("echo", Duration::from_secs(5));
        assert!(ctx.checkpoint().is_ok());
        ctx.cancellation_token().cancel();
        assert!(matches!(ctx.checkpoint(), Err(ToolError::Cancelled)));

        let expired = InvocationContext::standalone("echo", Duration::ZERO);
        assert!(matches!(expired.checkpoint(), Err(ToolError::Timeout(_))));
    }
}
