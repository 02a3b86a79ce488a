//! Error taxonomy for tool calls

use std::time::Duration;
use thiserror::Error;

/// Result type alias for tool operations
pub type Result<T> = std::result::Result<T, ToolError>;

/// Errors raised by tool clients
///
/// Ordinary 4xx rejections are not errors: adapters report them as a failed
/// [`ToolResponse`](crate::ToolResponse) so that an empty result can be told
/// apart from a broken channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// Backend could not be reached (DNS, refused, reset)
    #[error("connection to {url} failed: {message}")]
    Connection { url: String, message: String },

    /// Deadline exceeded, or the backend asked us to slow down (HTTP 429)
    #[error("request to {url} timed out: {message}")]
    Timeout {
        url: String,
        message: String,
        /// Delay requested by the backend through `Retry-After`
        retry_after: Option<Duration>,
    },

    /// Malformed request or response, or an oversized payload
    #[error("validation failed for {url}: {message}")]
    Validation {
        url: String,
        message: String,
        /// Raw payload, truncated for diagnostics
        payload: Option<String>,
    },

    /// Backend answered with HTTP 5xx
    #[error("server error from {url}: HTTP {status}: {message}")]
    Server {
        url: String,
        status: u16,
        message: String,
    },

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// The client was closed before the call completed
    #[error("client for {url} was closed")]
    Cancelled { url: String },
}

impl ToolError {
    /// Build a connection error
    pub fn connection(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Build a timeout error without a backend hint
    pub fn timeout(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Timeout {
            url: url.into(),
            message: message.into(),
            retry_after: None,
        }
    }

    /// Build the error used for HTTP 429 responses
    pub fn rate_limited(url: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::Timeout {
            url: url.into(),
            message: "rate limited (HTTP 429)".to_string(),
            retry_after,
        }
    }

    /// Build a validation error without payload
    pub fn validation(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            url: url.into(),
            message: message.into(),
            payload: None,
        }
    }

    /// Build a validation error carrying the offending payload
    pub fn validation_with_payload(
        url: impl Into<String>,
        message: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self::Validation {
            url: url.into(),
            message: message.into(),
            payload: Some(payload.into()),
        }
    }

    /// Build a server error
    pub fn server(url: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            url: url.into(),
            status,
            message: message.into(),
        }
    }

    /// Whether another attempt may succeed
    ///
    /// Only connection failures, timeouts (including rate limiting) and 5xx
    /// responses are transient.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Timeout { .. } | Self::Server { .. }
        )
    }

    /// Backend-supplied delay before the next attempt, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Timeout { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Backend URL the error relates to
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Connection { url, .. }
            | Self::Timeout { url, .. }
            | Self::Validation { url, .. }
            | Self::Server { url, .. }
            | Self::Cancelled { url } => Some(url),
            Self::Config(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ToolError::connection("http://a", "refused").is_transient());
        assert!(ToolError::timeout("http://a", "deadline").is_transient());
        assert!(ToolError::rate_limited("http://a", None).is_transient());
        assert!(ToolError::server("http://a", 503, "unavailable").is_transient());

        assert!(!ToolError::validation("http://a", "bad envelope").is_transient());
        assert!(!ToolError::Config("bad".to_string()).is_transient());
        assert!(
            !ToolError::Cancelled {
                url: "http://a".to_string()
            }
            .is_transient()
        );
    }

    #[test]
    fn test_retry_after_only_on_timeout() {
        let err = ToolError::rate_limited("http://a", Some(Duration::from_secs(2)));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));

        let err = ToolError::server("http://a", 500, "boom");
        assert_eq!(err.retry_after(), None);
    }

    #[test]
    fn test_display_includes_context() {
        let err = ToolError::server("http://drugs/mcp", 502, "bad gateway");
        assert_eq!(
            err.to_string(),
            "server error from http://drugs/mcp: HTTP 502: bad gateway"
        );
        assert_eq!(err.url(), Some("http://drugs/mcp"));
    }
}
