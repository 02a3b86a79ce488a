//! Lazily created HTTP session shared by the tool adapters
//!
//! The `reqwest::Client` (and its connection pool) is built on first use,
//! exactly once, and dropped by [`HttpSession::close`]. Closing also wakes
//! every request still in flight so it resolves to
//! [`ToolError::Cancelled`].

use medq_core::{Result, ToolError};
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{RequestBuilder, Response, StatusCode};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info};

/// Default cap on response bodies (1 MiB)
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// Default per-request deadline
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Size of the raw payload excerpt attached to validation errors
pub const PAYLOAD_PREVIEW_BYTES: usize = 2048;

/// Transport settings for one backend
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Deadline applied to every request
    pub timeout: Duration,
    /// Static headers sent with every request
    pub headers: HashMap<String, String>,
    /// Largest accepted response body
    pub max_response_bytes: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            headers: HashMap::new(),
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }
}

enum SessionState {
    Idle,
    Open(reqwest::Client),
    Closed,
}

/// Raw reply of one HTTP exchange
#[derive(Debug)]
pub(crate) struct HttpReply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpReply {
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    /// Body excerpt suitable for logs and error messages
    pub fn preview(&self) -> String {
        truncate_payload(&self.body)
    }
}

/// Reply after status classification
#[derive(Debug)]
pub(crate) enum Classified {
    /// 2xx
    Success(HttpReply),
    /// 4xx other than 429, formatted as `HTTP <code>: <body>`
    Rejected(String),
}

/// Lazily created, closable HTTP session
pub(crate) struct HttpSession {
    url: String,
    options: SessionOptions,
    headers: HeaderMap,
    state: Mutex<SessionState>,
    closed: watch::Sender<bool>,
}

impl HttpSession {
    /// Create a session; no network resources are allocated yet
    pub fn new(url: impl Into<String>, options: SessionOptions) -> Result<Self> {
        let headers = build_headers(&options.headers)?;
        let (closed, _) = watch::channel(false);

        Ok(Self {
            url: url.into(),
            options,
            headers,
            state: Mutex::new(SessionState::Idle),
            closed,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the underlying client has been created and not closed
    pub async fn is_open(&self) -> bool {
        matches!(*self.state.lock().await, SessionState::Open(_))
    }

    /// Return the pooled client, creating it on first use
    async fn client(&self) -> Result<reqwest::Client> {
        let mut state = self.state.lock().await;

        match &*state {
            SessionState::Open(client) => Ok(client.clone()),
            SessionState::Closed => Err(self.cancelled()),
            SessionState::Idle => {
                let client = reqwest::Client::builder()
                    .timeout(self.options.timeout)
                    .default_headers(self.headers.clone())
                    .build()
                    .map_err(|e| {
                        ToolError::Config(format!("failed to build HTTP client: {e}"))
                    })?;

                info!("Opened HTTP session for {}", self.url);
                *state = SessionState::Open(client.clone());
                Ok(client)
            }
        }
    }

    /// Drop the pooled client and cancel in-flight requests
    ///
    /// Returns `false` when the session was already closed.
    pub async fn close(&self) -> bool {
        let mut state = self.state.lock().await;
        if matches!(*state, SessionState::Closed) {
            return false;
        }

        *state = SessionState::Closed;
        self.closed.send_replace(true);
        true
    }

    /// Perform one HTTP exchange
    ///
    /// `timeout` overrides the session deadline for this request only. The
    /// body is read under the configured size cap.
    pub async fn send<F>(&self, build: F, timeout: Option<Duration>) -> Result<HttpReply>
    where
        F: FnOnce(&reqwest::Client) -> RequestBuilder,
    {
        // Subscribe before fetching the client so a close() racing with this
        // call is always observed.
        let mut closed = self.closed.subscribe();
        let client = self.client().await?;
        let mut request = build(&client);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        tokio::select! {
            biased;
            _ = closed.changed() => {
                debug!("Request to {} cancelled by close()", self.url);
                Err(self.cancelled())
            }
            reply = self.exchange(request) => reply,
        }
    }

    async fn exchange(&self, request: RequestBuilder) -> Result<HttpReply> {
        let mut response = request
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = self.read_body(&mut response).await?;

        debug!(
            "Received HTTP {} from {} ({} bytes)",
            status,
            self.url,
            body.len()
        );

        Ok(HttpReply {
            status,
            headers,
            body,
        })
    }

    /// Read the body, refusing anything above the size cap
    ///
    /// Oversized bodies are rejected before any parsing is attempted.
    async fn read_body(&self, response: &mut Response) -> Result<Vec<u8>> {
        let limit = self.options.max_response_bytes;

        if let Some(length) = response.content_length() {
            if length > limit as u64 {
                return Err(self.oversized(length));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.transport_error(&e))?
        {
            if body.len() + chunk.len() > limit {
                return Err(self.oversized((body.len() + chunk.len()) as u64));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }

    /// Map the status code onto the error taxonomy
    pub fn classify(&self, reply: HttpReply) -> Result<Classified> {
        let status = reply.status;

        if status.is_success() {
            return Ok(Classified::Success(reply));
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ToolError::rate_limited(
                &self.url,
                parse_retry_after(&reply.headers),
            ));
        }

        if status.is_server_error() {
            return Err(ToolError::server(
                &self.url,
                status.as_u16(),
                reply.preview(),
            ));
        }

        if status.is_client_error() {
            return Ok(Classified::Rejected(format!(
                "HTTP {}: {}",
                status.as_u16(),
                reply.preview()
            )));
        }

        Err(ToolError::validation_with_payload(
            &self.url,
            format!("unexpected HTTP status {status}"),
            reply.preview(),
        ))
    }

    fn transport_error(&self, error: &reqwest::Error) -> ToolError {
        let message = error_chain(error);

        if error.is_timeout() {
            ToolError::timeout(&self.url, message)
        } else if error.is_builder() {
            ToolError::validation(&self.url, message)
        } else {
            ToolError::connection(&self.url, message)
        }
    }

    fn oversized(&self, length: u64) -> ToolError {
        ToolError::validation(
            &self.url,
            format!(
                "response body of {length} bytes exceeds limit of {} bytes",
                self.options.max_response_bytes
            ),
        )
    }

    fn cancelled(&self) -> ToolError {
        ToolError::Cancelled {
            url: self.url.clone(),
        }
    }
}

/// Build HTTP headers from configuration
fn build_headers(headers: &HashMap<String, String>) -> Result<HeaderMap> {
    let mut header_map = HeaderMap::new();

    for (key, value) in headers {
        let name = HeaderName::from_str(key)
            .map_err(|e| ToolError::Config(format!("Invalid header name '{key}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ToolError::Config(format!("Invalid header value for '{key}': {e}")))?;
        header_map.insert(name, value);
    }

    Ok(header_map)
}

/// Parse a `Retry-After` header given in delta-seconds
///
/// The HTTP-date form is not supported and yields `None`, which makes the
/// retry strategy fall back to its exponential schedule.
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Lossy UTF-8 excerpt of at most [`PAYLOAD_PREVIEW_BYTES`]
pub(crate) fn truncate_payload(bytes: &[u8]) -> String {
    if bytes.len() <= PAYLOAD_PREVIEW_BYTES {
        return String::from_utf8_lossy(bytes).into_owned();
    }

    let mut preview = String::from_utf8_lossy(&bytes[..PAYLOAD_PREVIEW_BYTES]).into_owned();
    preview.push_str("...[truncated]");
    preview
}

/// Render an error with its source chain
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();

    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    message
}
