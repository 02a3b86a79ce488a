//! Result of a single tool invocation

use serde::Serialize;
use serde_json::{Map, Value};

/// Well-known metadata keys set by every adapter
pub mod keys {
    /// Wall-clock time of the call in milliseconds, retries included
    pub const LATENCY_MS: &str = "latency_ms";
    /// Backend identifier the call was routed to
    pub const BACKEND: &str = "backend";
    /// Name of the invoked tool
    pub const TOOL: &str = "tool";
}

const UNKNOWN_ERROR: &str = "unknown error";

/// Outcome of a tool call
///
/// A response is immutable once built. `success == false` always comes with a
/// non-empty error message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    metadata: Map<String, Value>,
}

impl ToolResponse {
    /// Create a successful response
    pub fn success(data: Value, metadata: Map<String, Value>) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata,
        }
    }

    /// Create a failed response
    ///
    /// An empty message is replaced with a placeholder so that failures are
    /// never silent.
    pub fn failure(error: impl Into<String>, metadata: Map<String, Value>) -> Self {
        let mut error = error.into();
        if error.trim().is_empty() {
            error = UNKNOWN_ERROR.to_string();
        }

        Self {
            success: false,
            data: None,
            error: Some(error),
            metadata,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Payload of a successful call
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Error message of a failed call
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Call latency recorded by the adapter
    pub fn latency_ms(&self) -> Option<u64> {
        self.metadata.get(keys::LATENCY_MS).and_then(Value::as_u64)
    }

    /// Backend the call was routed to
    pub fn backend(&self) -> Option<&str> {
        self.metadata.get(keys::BACKEND).and_then(Value::as_str)
    }

    /// Concatenate the text blocks of an MCP content array
    ///
    /// Returns `None` when the payload is not a content array or holds no text.
    pub fn text(&self) -> Option<String> {
        let blocks = self.data.as_ref()?.as_array()?;

        let parts: Vec<&str> = blocks
            .iter()
            .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }

    /// Consume the response, returning the payload
    pub fn into_data(self) -> Option<Value> {
        self.data
    }
}
