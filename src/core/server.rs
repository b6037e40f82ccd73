//! Dispatch engine.
//!
//! [`ToolServer`] turns one decoded request into exactly one response. For
//! `call_tool` it resolves the tool, validates the arguments against the
//! published schema, runs the handler on its own task under a deadline and a
//! cancellation token, and converts every failure (error, timeout,
//! cancellation, panic) into an error envelope. Nothing a handler does can
//! reach the output stream except through the returned [`Response`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::{Map, Value, json};
use tokio::task::JoinError;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::config::{Config, MAX_CALL_TIMEOUT};
use super::protocol::{
    CallToolParams, CancelParams, ErrorCode, Method, PROTOCOL_VERSION, Request, RequestId, Response,
};
use super::sanitize::sanitize_message;
use crate::domains::tools::{
    CallToolResult, InvocationContext, ToolError, ToolOutput, ToolRegistry, ToolResult, schema,
};

/// The dispatch engine shared by every request of a session.
pub struct ToolServer {
    config: Arc<Config>,
    registry: ToolRegistry,
    /// Cancellation handles of calls currently executing, by request id.
    in_flight: Mutex<HashMap<RequestId, CancellationToken>>,
}

impl ToolServer {
    /// Create a server over a fully built registry.
    pub fn new(config: Arc<Config>, registry: ToolRegistry) -> Self {
        Self {
            config,
            registry,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.config.server.name
    }

    /// Get the server version.
    pub fn version(&self) -> &str {
        &self.config.server.version
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Number of `call_tool` requests currently executing.
    pub fn in_flight(&self) -> usize {
        self.calls().len()
    }

    /// Answer one request.
    ///
    /// `shutdown` is the session-wide token; cancelling it cancels every
    /// call still running.
    pub async fn handle(&self, request: Request, shutdown: &CancellationToken) -> Response {
        let Request { id, method, params } = request;
        debug!(id = %id, method = method.as_str(), "Handling request");

        match method {
            Method::Initialize => Response::success(id, self.initialize()),
            Method::ListTools => Response::success(id, self.list_tools()),
            Method::CallTool => self.call_tool(id, params, shutdown).await,
            Method::Ping => Response::success(id, json!({})),
            Method::Cancel => self.cancel(id, params),
            Method::Unknown(name) => {
                warn!("Unknown method: {}", name);
                Response::error(
                    Some(id),
                    ErrorCode::UnknownMethod,
                    sanitize_message(&format!("Unknown method: {}", name)),
                )
            }
        }
    }

    // ========================================================================
    // Protocol operations
    // ========================================================================

    fn initialize(&self) -> Value {
        info!("Client initialized session");
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": {
                "name": self.name(),
                "version": self.version(),
            },
            "capabilities": {
                "tools": { "count": self.registry.len() },
                "concurrency": { "maxInFlight": self.config.dispatch.max_in_flight },
                "cancellation": true,
                "maxResultBytes": self.config.dispatch.max_result_bytes,
                "framing": self.config.transport.framing.as_str(),
            },
        })
    }

    fn list_tools(&self) -> Value {
        let tools: Vec<Value> = self.registry.list().map(|d| d.to_value()).collect();
        debug!("Listing {} tools", tools.len());
        json!({ "tools": tools })
    }

    fn cancel(&self, id: RequestId, params: Map<String, Value>) -> Response {
        let params: CancelParams = match serde_json::from_value(Value::Object(params)) {
            Ok(params) => params,
            Err(e) => {
                return Response::error(
                    Some(id),
                    ErrorCode::InvalidArguments,
                    format!("Invalid cancel params: {}", e),
                );
            }
        };

        let token = self.calls().get(&params.id).cloned();
        let cancelled = match token {
            Some(token) => {
                info!(target_id = %params.id, "Cancelling request");
                token.cancel();
                true
            }
            None => {
                debug!(target_id = %params.id, "Nothing to cancel");
                false
            }
        };
        Response::success(id, json!({ "cancelled": cancelled }))
    }

    async fn call_tool(&self, id: RequestId, params: Map<String, Value>, shutdown: &CancellationToken) -> Response {
        let started = Instant::now();

        let params: CallToolParams = match serde_json::from_value(Value::Object(params)) {
            Ok(params) => params,
            Err(e) => {
                return Response::error(
                    Some(id),
                    ErrorCode::InvalidArguments,
                    format!("Invalid call_tool params: {}", e),
                );
            }
        };

        let Some(tool) = self.registry.resolve(&params.name) else {
            warn!("Unknown tool requested: {}", params.name);
            return Response::error(
                Some(id),
                ErrorCode::UnknownTool,
                sanitize_message(&format!("Unknown tool: {}", params.name)),
            );
        };
        let descriptor = &tool.descriptor;
        let span = info_span!("call_tool", id = %id, tool = %descriptor.name);

        // Validated: the handler never sees arguments that fail the schema
        let arguments = match schema::validate_arguments(&descriptor.input_schema, params.arguments) {
            Ok(arguments) => arguments,
            Err(problems) => {
                let message = problems.join("; ");
                warn!(parent: &span, "Rejected arguments: {}", message);
                return Response::error(Some(id), ErrorCode::InvalidArguments, sanitize_message(&message));
            }
        };

        let token = shutdown.child_token();
        let Some(_registration) = self.register_call(&id, &token) else {
            return Response::error(
                Some(id.clone()),
                ErrorCode::InvalidArguments,
                format!("Request id {} is already in flight", id),
            );
        };

        let now = Instant::now();
        let deadline = now
            .checked_add(descriptor.timeout)
            .unwrap_or_else(|| now + MAX_CALL_TIMEOUT);
        let ctx = InvocationContext::new(id.clone(), &descriptor.name, deadline, token.clone(), span.clone());

        let outcome = match tool.handler.clone().bind(arguments, ctx) {
            Ok(future) => {
                self.supervise(future.instrument(span.clone()), &token, deadline, descriptor.timeout)
                    .await
            }
            Err(e) => Err(e),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(output) => {
                let result = CallToolResult::from_output(output, self.config.dispatch.max_result_bytes);
                if let Some(original) = result.original_bytes {
                    info!(parent: &span, elapsed_ms, original, "Call completed, result truncated");
                } else {
                    info!(parent: &span, elapsed_ms, "Call completed");
                }
                match serde_json::to_value(&result) {
                    Ok(value) => Response::success(id, value),
                    Err(e) => Response::error(
                        Some(id),
                        ErrorCode::InternalError,
                        format!("Failed to encode result: {}", e),
                    ),
                }
            }
            Err(err) => {
                let code = error_code(&err);
                // Full detail stays on the diagnostic channel
                warn!(parent: &span, elapsed_ms, code = code.as_str(), "Call failed: {}", err);
                Response::error(Some(id), code, sanitize_message(&err.to_string()))
            }
        }
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Run a bound handler on its own task and wait for it, its deadline or
    /// its cancellation, whichever comes first.
    ///
    /// On deadline or cancellation the handler's token is cancelled and it
    /// gets `cancel_grace` to wind down (killing children, closing sockets)
    /// before the task is aborted.
    async fn supervise<F>(
        &self,
        future: F,
        token: &CancellationToken,
        deadline: Instant,
        budget: Duration,
    ) -> ToolResult<ToolOutput>
    where
        F: Future<Output = ToolResult<ToolOutput>> + Send + 'static,
    {
        let mut task = tokio::spawn(future);

        let interrupted = tokio::select! {
            biased;
            joined = &mut task => return flatten_join(joined),
            _ = token.cancelled() => ToolError::Cancelled,
            _ = sleep_until(deadline) => ToolError::Timeout(budget),
        };

        token.cancel();
        match tokio::time::timeout(self.config.dispatch.cancel_grace, &mut task).await {
            Ok(_) => debug!("Handler stopped after cancellation"),
            Err(_) => {
                warn!("Handler ignored cancellation for {:?}; aborting", self.config.dispatch.cancel_grace);
                task.abort();
            }
        }
        Err(interrupted)
    }

    fn calls(&self) -> std::sync::MutexGuard<'_, HashMap<RequestId, CancellationToken>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register_call(&self, id: &RequestId, token: &CancellationToken) -> Option<CallRegistration<'_>> {
        let mut calls = self.calls();
        if calls.contains_key(id) {
            return None;
        }
        calls.insert(id.clone(), token.clone());
        Some(CallRegistration {
            server: self,
            id: id.clone(),
        })
    }
}

/// Removes a call from the in-flight table when it finishes, however it finishes.
struct CallRegistration<'a> {
    server: &'a ToolServer,
    id: RequestId,
}

impl Drop for CallRegistration<'_> {
    fn drop(&mut self) {
        self.server.calls().remove(&self.id);
    }
}

/// Error code a tool failure is reported under.
pub fn error_code(err: &ToolError) -> ErrorCode {
    match err {
        ToolError::InvalidArguments(_) => ErrorCode::InvalidArguments,
        ToolError::Timeout(_) => ErrorCode::Timeout,
        ToolError::Cancelled => ErrorCode::Cancelled,
        ToolError::ExecutionFailed(_) | ToolError::Internal(_) => ErrorCode::InternalError,
    }
}

fn flatten_join(joined: Result<ToolResult<ToolOutput>, JoinError>) -> ToolResult<ToolOutput> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => {
            let message = panic_message(e.into_panic());
            error!("Tool handler panicked: {}", message);
            Err(ToolError::internal(format!("tool handler panicked: {}", message)))
        }
        Err(e) => Err(ToolError::internal(format!("tool task failed: {}", e))),
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ============================================================================
// Test tools
// ============================================================================


// ============================================================================
// Tests
// ============================================================================
