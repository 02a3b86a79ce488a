//! Tool client port and its HTTP adapters

use async_trait::async_trait;
use medq_core::response::keys;
use medq_core::{HealthStatus, Result, RetryConfig, ToolError, ToolMetadata, ToolResponse};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub mod jsonrpc;
pub mod manager;
pub mod rest;
pub mod session;

pub use jsonrpc::JsonRpcToolClient;
pub use rest::RestToolClient;

/// Uniform interface over heterogeneous tool backends
///
/// Note: all methods take `&self` so clients can be shared through `Arc`.
/// Implementations use interior mutability for their session state.
#[async_trait]
pub trait ToolClient: Send + Sync {
    /// Backend identifier, reported in response metadata
    fn backend(&self) -> &str;

    /// Invoke a named tool, optionally overriding the client's retry policy
    ///
    /// 4xx rejections other than 429 come back as a failed [`ToolResponse`];
    /// transport failures, timeouts, 429 and 5xx are raised as [`ToolError`]
    /// once retries are exhausted.
    async fn call_tool_with(
        &self,
        name: &str,
        params: Value,
        retry: Option<RetryConfig>,
    ) -> Result<ToolResponse>;

    /// Invoke a named tool with the client's own retry policy
    async fn call_tool(&self, name: &str, params: Value) -> Result<ToolResponse> {
        self.call_tool_with(name, params, None).await
    }

    /// Issue one bounded probe; never fails, never retries
    async fn health_check(&self, timeout: Duration) -> HealthStatus;

    /// Describe the tools exposed by the backend
    async fn list_tools(&self) -> Result<Vec<ToolMetadata>>;

    /// Release the pooled session; idempotent
    ///
    /// Calls still in flight resolve to [`ToolError::Cancelled`].
    async fn close(&self);
}

/// Type alias for Arc-wrapped tool client
pub type ArcToolClient = Arc<dyn ToolClient>;

/// Result of a single attempt that reached the backend
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CallOutcome {
    /// Tool produced a payload
    Data(Value),
    /// Backend rejected the call at application level
    Failed(String),
}

/// Check a call before it touches the network
///
/// `null` params are treated as an empty object.
pub(crate) fn prepare_params(url: &str, name: &str, params: Value) -> Result<Value> {
    if name.trim().is_empty() {
        return Err(ToolError::validation(url, "tool name must not be empty"));
    }

    match params {
        Value::Null => Ok(Value::Object(Map::new())),
        Value::Object(_) => Ok(params),
        other => Err(ToolError::validation_with_payload(
            url,
            "tool params must be a JSON object",
            other.to_string(),
        )),
    }
}

/// Wrap an outcome with the metadata every response carries
pub(crate) fn into_response(
    backend: &str,
    tool: &str,
    started: Instant,
    outcome: CallOutcome,
) -> ToolResponse {
    let mut metadata = Map::new();
    metadata.insert(
        keys::LATENCY_MS.to_string(),
        Value::from(elapsed_ms(started)),
    );
    metadata.insert(keys::BACKEND.to_string(), Value::from(backend));
    metadata.insert(keys::TOOL.to_string(), Value::from(tool));

    match outcome {
        CallOutcome::Data(data) => ToolResponse::success(data, metadata),
        CallOutcome::Failed(error) => ToolResponse::failure(error, metadata),
    }
}

/// Fold a probe error into a health snapshot
pub(crate) fn health_from_error(error: &ToolError, latency_ms: u64) -> HealthStatus {
    match error {
        ToolError::Connection { .. } | ToolError::Cancelled { .. } => {
            HealthStatus::unavailable(error.to_string())
        }
        ToolError::Timeout { .. } => HealthStatus::timeout(latency_ms),
        _ => HealthStatus::unhealthy(Some(latency_ms), error.to_string()),
    }
}

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
