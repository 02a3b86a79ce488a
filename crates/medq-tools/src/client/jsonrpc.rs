//! JSON-RPC 2.0 over streamable HTTP
//!
//! Communicates with a backend exposing a single endpoint that accepts
//! JSON-RPC envelopes via HTTP POST. Replies are either plain JSON or a
//! `text/event-stream` carrying the envelope in a `data:` event.

use super::session::{Classified, HttpReply, HttpSession, SessionOptions, truncate_payload};
use super::{
    CallOutcome, ToolClient, elapsed_ms, health_from_error, into_response, prepare_params,
};
use crate::config::BackendConfig;
use crate::health::PROBE_GRACE;
use crate::retry::RetryStrategy;
use async_trait::async_trait;
use medq_core::{HealthStatus, Result, RetryConfig, ToolError, ToolMetadata, ToolResponse};
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde_json::{Map, Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

const JSONRPC_VERSION: &str = "2.0";
const PROTOCOL_VERSION: &str = "2025-03-26";
const SESSION_HEADER: &str = "Mcp-Session-Id";
const ACCEPT_VALUE: &str = "application/json, text/event-stream";

/// Decoded JSON-RPC reply
#[derive(Debug)]
enum RpcOutcome {
    /// `result` member of the envelope
    Result(Value),
    /// `error` member of the envelope
    Error { code: i64, message: String },
    /// 4xx rejection before JSON-RPC processing
    Rejected(String),
}

/// Tool client for JSON-RPC streamable-HTTP backends
pub struct JsonRpcToolClient {
    backend: String,

    /// Lazily created HTTP session
    session: HttpSession,

    /// Default retry policy for calls
    retry: RetryConfig,

    /// Request ID counter, scoped to this client
    next_id: AtomicU64,

    /// Perform the MCP `initialize` handshake before the first request
    initialize: bool,

    /// Session id negotiated by the handshake
    mcp_session: OnceCell<Option<String>>,
}

impl JsonRpcToolClient {
    /// Create a new JSON-RPC tool client
    ///
    /// No connection is made until the first call.
    ///
    /// # Arguments
    ///
    /// * `backend` - Backend identifier
    /// * `url` - Endpoint URL
    /// * `options` - Timeout, headers and response size cap
    pub fn new(
        backend: impl Into<String>,
        url: impl Into<String>,
        options: SessionOptions,
    ) -> Result<Self> {
        Ok(Self {
            backend: backend.into(),
            session: HttpSession::new(url, options)?,
            retry: RetryConfig::default(),
            next_id: AtomicU64::new(1),
            initialize: false,
            mcp_session: OnceCell::new(),
        })
    }

    /// Use a custom default retry policy
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Perform the MCP `initialize` handshake on first use
    pub fn with_initialize(mut self, initialize: bool) -> Self {
        self.initialize = initialize;
        self
    }

    /// Create from a backend configuration entry
    pub fn from_config(
        backend: &str,
        config: &BackendConfig,
        retry: RetryConfig,
        max_response_bytes: usize,
    ) -> Result<Self> {
        match config {
            BackendConfig::JsonRpc {
                url, initialize, ..
            } => Ok(Self::new(
                backend,
                url.clone(),
                config.session_options(max_response_bytes),
            )?
            .with_retry_config(retry)
            .with_initialize(*initialize)),
            BackendConfig::Rest { .. } => Err(ToolError::Config(format!(
                "backend '{backend}' is not configured for the jsonrpc transport"
            ))),
        }
    }

    pub fn url(&self) -> &str {
        self.session.url()
    }

    /// Whether the HTTP session is open
    pub async fn is_connected(&self) -> bool {
        self.session.is_open().await
    }

    /// Get next request ID
    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Run the handshake once per session, if enabled
    async fn ensure_session(&self) -> Result<Option<String>> {
        if !self.initialize {
            return Ok(None);
        }

        self.mcp_session
            .get_or_try_init(|| self.handshake())
            .await
            .cloned()
    }

    /// Send `initialize` followed by the `initialized` notification
    async fn handshake(&self) -> Result<Option<String>> {
        let id = self.next_request_id();
        let envelope = json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": id,
            "method": "initialize",
            "params": {
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": "medq",
                    "version": env!("CARGO_PKG_VERSION")
                }
            }
        });

        let reply = self.post(&envelope, None, None).await?;
        let session_id = reply
            .headers
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        match self.interpret(reply, id)? {
            RpcOutcome::Result(result) => {
                let server = result["serverInfo"]["name"].as_str().unwrap_or("unknown");
                info!("Initialized MCP session with {} ({})", self.url(), server);
            }
            RpcOutcome::Error { code, message } => {
                return Err(ToolError::validation(
                    self.url(),
                    format!("initialize failed with JSON-RPC error {code}: {message}"),
                ));
            }
            RpcOutcome::Rejected(message) => {
                return Err(ToolError::validation(
                    self.url(),
                    format!("initialize rejected: {message}"),
                ));
            }
        }

        let notification = json!({
            "jsonrpc": JSONRPC_VERSION,
            "method": "notifications/initialized"
        });
        if let Err(e) = self.post(&notification, session_id.as_deref(), None).await {
            debug!("initialized notification to {} failed: {}", self.url(), e);
        }

        Ok(session_id)
    }

    /// POST one envelope
    async fn post(
        &self,
        envelope: &Value,
        session_id: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<HttpReply> {
        let url = self.url().to_string();
        self.session
            .send(
                |client| {
                    let request = client
                        .post(&url)
                        .header(ACCEPT, ACCEPT_VALUE)
                        .json(envelope);
                    match session_id {
                        Some(id) => request.header(SESSION_HEADER, id),
                        None => request,
                    }
                },
                timeout,
            )
            .await
    }

    /// Send a request and return the raw reply together with its id
    async fn exchange(
        &self,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<(HttpReply, u64)> {
        let session_id = self.ensure_session().await?;
        let id = self.next_request_id();

        let envelope = json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": id,
            "method": method,
            "params": params
        });

        debug!("Sending JSON-RPC request {} to {}: {}", id, self.url(), method);

        let reply = self.post(&envelope, session_id.as_deref(), timeout).await?;
        Ok((reply, id))
    }

    /// Send a request and decode its reply
    async fn rpc(&self, method: &str, params: Value) -> Result<RpcOutcome> {
        let (reply, id) = self.exchange(method, params, None).await?;
        self.interpret(reply, id)
    }

    /// Classify the status and decode the envelope
    fn interpret(&self, reply: HttpReply, id: u64) -> Result<RpcOutcome> {
        let reply = match self.session.classify(reply)? {
            Classified::Success(reply) => reply,
            Classified::Rejected(message) => return Ok(RpcOutcome::Rejected(message)),
        };

        let envelope = self.decode_envelope(&reply, id)?;

        if let Some(error) = envelope.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Ok(RpcOutcome::Error { code, message });
        }

        envelope
            .get("result")
            .cloned()
            .map(RpcOutcome::Result)
            .ok_or_else(|| {
                ToolError::validation_with_payload(
                    self.url(),
                    "JSON-RPC response has neither result nor error",
                    reply.preview(),
                )
            })
    }

    /// Parse the body into a JSON-RPC envelope answering request `id`
    fn decode_envelope(&self, reply: &HttpReply, id: u64) -> Result<Map<String, Value>> {
        let is_event_stream = reply
            .content_type()
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        let value = if is_event_stream {
            self.envelope_from_event_stream(reply, id)?
        } else {
            serde_json::from_slice::<Value>(&reply.body).map_err(|e| {
                ToolError::validation_with_payload(
                    self.url(),
                    format!("response is not valid JSON: {e}"),
                    reply.preview(),
                )
            })?
        };

        let Value::Object(envelope) = value else {
            return Err(ToolError::validation_with_payload(
                self.url(),
                "JSON-RPC response is not an object",
                reply.preview(),
            ));
        };

        if envelope.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Err(ToolError::validation_with_payload(
                self.url(),
                "missing or unsupported jsonrpc version",
                reply.preview(),
            ));
        }

        if envelope.get("id").and_then(Value::as_u64) != Some(id) {
            return Err(ToolError::validation_with_payload(
                self.url(),
                format!("response id does not match request id {id}"),
                reply.preview(),
            ));
        }

        Ok(envelope)
    }

    /// Pick the first `data:` event carrying the response to `id`
    fn envelope_from_event_stream(&self, reply: &HttpReply, id: u64) -> Result<Value> {
        let text = String::from_utf8_lossy(&reply.body).replace("\r\n", "\n");

        text.split("\n\n")
            .filter_map(|event| {
                let data: Vec<&str> = event
                    .lines()
                    .filter_map(|line| line.strip_prefix("data:"))
                    .map(|line| line.strip_prefix(' ').unwrap_or(line))
                    .collect();
                if data.is_empty() {
                    None
                } else {
                    serde_json::from_str::<Value>(&data.join("\n")).ok()
                }
            })
            .find(|message| message.get("id").and_then(Value::as_u64) == Some(id))
            .ok_or_else(|| {
                ToolError::validation_with_payload(
                    self.url(),
                    format!("event stream carries no response for request {id}"),
                    reply.preview(),
                )
            })
    }

    /// Extract `result.content` of a `tools/call` reply
    fn unwrap_content(&self, result: Value) -> Result<CallOutcome> {
        let invalid = |message: &str| {
            ToolError::validation_with_payload(
                self.url(),
                message,
                truncate_payload(result.to_string().as_bytes()),
            )
        };

        let Some(object) = result.as_object() else {
            return Err(invalid("tools/call result is not an object"));
        };

        let Some(content) = object.get("content").and_then(Value::as_array) else {
            return Err(invalid("tools/call result has no content array"));
        };

        let well_formed = content.iter().all(|block| {
            block.is_object() && block.get("type").and_then(Value::as_str).is_some()
        });
        if !well_formed {
            return Err(invalid("content block without a string type"));
        }

        if object.get("isError").and_then(Value::as_bool) == Some(true) {
            let text: Vec<&str> = content
                .iter()
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect();
            return Ok(CallOutcome::Failed(if text.is_empty() {
                "tool reported an error".to_string()
            } else {
                text.join("\n")
            }));
        }

        Ok(CallOutcome::Data(Value::Array(content.clone())))
    }

    /// One `tools/call` attempt
    async fn call_once(&self, arguments: &Value) -> Result<CallOutcome> {
        match self.rpc("tools/call", arguments.clone()).await? {
            RpcOutcome::Result(result) => self.unwrap_content(result),
            RpcOutcome::Error { code, message } => Ok(CallOutcome::Failed(format!(
                "JSON-RPC error {code}: {message}"
            ))),
            RpcOutcome::Rejected(message) => Ok(CallOutcome::Failed(message)),
        }
    }

    fn parse_tools(&self, result: &Value) -> Result<Vec<ToolMetadata>> {
        let tools = result.get("tools").cloned().ok_or_else(|| {
            ToolError::validation_with_payload(
                self.url(),
                "tools/list result has no tools array",
                truncate_payload(result.to_string().as_bytes()),
            )
        })?;

        serde_json::from_value(tools).map_err(|e| {
            ToolError::validation(self.url(), format!("Failed to parse tools: {e}"))
        })
    }

    async fn probe(&self, timeout: Duration, started: Instant) -> HealthStatus {
        let (reply, id) = match self.exchange("tools/list", json!({}), Some(timeout)).await {
            Ok(exchange) => exchange,
            Err(e) => return health_from_error(&e, elapsed_ms(started)),
        };

        if reply.status == StatusCode::TOO_MANY_REQUESTS {
            return HealthStatus::unhealthy(Some(elapsed_ms(started)), "rate limited (HTTP 429)");
        }

        match self.interpret(reply, id) {
            Ok(RpcOutcome::Result(result)) => {
                let tool_count = result
                    .get("tools")
                    .and_then(Value::as_array)
                    .map(Vec::len);
                HealthStatus::healthy(elapsed_ms(started), tool_count)
            }
            Ok(RpcOutcome::Error { code, message }) => HealthStatus::unhealthy(
                Some(elapsed_ms(started)),
                format!("JSON-RPC error {code}: {message}"),
            ),
            Ok(RpcOutcome::Rejected(message)) => {
                HealthStatus::unhealthy(Some(elapsed_ms(started)), message)
            }
            Err(e) => health_from_error(&e, elapsed_ms(started)),
        }
    }

    /// Session id negotiated by the handshake, if any
    pub fn mcp_session_id(&self) -> Option<&str> {
        self.mcp_session.get().and_then(Option::as_deref)
    }
}

#[async_trait]
impl ToolClient for JsonRpcToolClient {
    fn backend(&self) -> &str {
        &self.backend
    }

    async fn call_tool_with(
        &self,
        name: &str,
        params: Value,
        retry: Option<RetryConfig>,
    ) -> Result<ToolResponse> {
        let params = prepare_params(self.url(), name, params)?;
        let arguments = json!({
            "name": name,
            "arguments": params
        });

        let strategy = RetryStrategy::new(retry.unwrap_or_else(|| self.retry.clone()));
        let started = Instant::now();
        let operation = format!("{}/{}", self.backend, name);

        let outcome = strategy
            .execute(&operation, || self.call_once(&arguments))
            .await?;

        if let CallOutcome::Failed(message) = &outcome {
            debug!("Tool {} rejected the call: {}", operation, message);
        }

        Ok(into_response(&self.backend, name, started, outcome))
    }

    async fn health_check(&self, timeout: Duration) -> HealthStatus {
        let started = Instant::now();

        // The adapter owns the probe deadline, so direct callers get the same bound
        // as the aggregator.
        match tokio::time::timeout(timeout + PROBE_GRACE, self.probe(timeout, started)).await {
            Ok(status) => status,
            Err(_) => {
                warn!("Health probe for {} exceeded its deadline", self.backend);
                HealthStatus::timeout(elapsed_ms(started))
            }
        }
    }

    async fn list_tools(&self) -> Result<Vec<ToolMetadata>> {
        let strategy = RetryStrategy::new(self.retry.clone());
        let operation = format!("{}/tools/list", self.backend);

        let outcome = strategy
            .execute(&operation, || self.rpc("tools/list", json!({})))
            .await?;

        match outcome {
            RpcOutcome::Result(result) => self.parse_tools(&result),
            RpcOutcome::Error { code, message } => Err(ToolError::validation(
                self.url(),
                format!("tools/list failed with JSON-RPC error {code}: {message}"),
            )),
            RpcOutcome::Rejected(message) => Err(ToolError::validation(
                self.url(),
                format!("tools/list rejected: {message}"),
            )),
        }
    }

    async fn close(&self) {
        if self.session.close().await {
            info!("Closed tool client {} ({})", self.backend, self.url());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medq_core::HealthState;
    use std::collections::HashSet;
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn fast_retry() -> RetryConfig {
        RetryConfig::builder()
            .max_retries(3)
            .base_delay(Duration::from_millis(10))
            .max_delay(Duration::from_millis(50))
            .build()
            .unwrap()
    }

    fn client(server: &MockServer) -> JsonRpcToolClient {
        JsonRpcToolClient::new(
            "drug_db",
            format!("{}/mcp", server.uri()),
            SessionOptions::default(),
        )
        .unwrap()
        .with_retry_config(fast_retry())
    }

    fn request_id(request: &Request) -> Value {
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        body["id"].clone()
    }

    /// Answer every request with `result`, echoing its id
    fn reply_with(result: Value) -> impl Fn(&Request) -> ResponseTemplate + Send + Sync + 'static {
        move |request: &Request| {
            ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": request_id(request),
                "result": result
            }))
        }
    }

    fn text_content(text: &str) -> Value {
        json!({"content": [{"type": "text", "text": text}]})
    }

    #[tokio::test]
    async fn test_call_tool_unwraps_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(json!({
                "method": "tools/call",
                "params": {"name": "lookup", "arguments": {"drug": "aspirin"}}
            })))
            .respond_with(reply_with(text_content("NSAID")))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let response = client
            .call_tool("lookup", json!({"drug": "aspirin"}))
            .await
            .unwrap();

        assert!(response.is_success());
        assert_eq!(response.text().as_deref(), Some("NSAID"));
        assert_eq!(response.backend(), Some("drug_db"));
        assert!(response.latency_ms().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_calls_use_unique_ids() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(reply_with(text_content("ok")))
            .mount(&server)
            .await;

        let client = Arc::new(client(&server));
        let calls = (0..100).map(|i| {
            let client = client.clone();
            async move { client.call_tool("lookup", json!({"n": i})).await }
        });

        let results = futures::future::join_all(calls).await;
        assert!(results.iter().all(|r| r.as_ref().is_ok_and(ToolResponse::is_success)));

        let requests = server.received_requests().await.unwrap();
        let ids: HashSet<u64> = requests
            .iter()
            .filter_map(|r| request_id(r).as_u64())
            .collect();
        assert_eq!(requests.len(), 100);
        assert_eq!(ids.len(), 100);
    }

    #[tokio::test]
    async fn test_malformed_envelope_is_validation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server).call_tool("lookup", json!({})).await.unwrap_err();

        match err {
            ToolError::Validation { payload, .. } => {
                assert_eq!(payload.as_deref(), Some("<html>oops</html>"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mismatched_id_is_validation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 9999,
                "result": {"content": []}
            })))
            .mount(&server)
            .await;

        let err = client(&server).call_tool("lookup", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_oversized_response_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(reply_with(text_content(&"x".repeat(8192))))
            .mount(&server)
            .await;

        let client = JsonRpcToolClient::new(
            "drug_db",
            format!("{}/mcp", server.uri()),
            SessionOptions {
                max_response_bytes: 1024,
                ..SessionOptions::default()
            },
        )
        .unwrap();

        let err = client.call_tool("lookup", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_jsonrpc_error_becomes_failed_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(|request: &Request| {
                ResponseTemplate::new(200).set_body_json(json!({
                    "jsonrpc": "2.0",
                    "id": request_id(request),
                    "error": {"code": -32601, "message": "Method not found"}
                }))
            })
            .expect(1)
            .mount(&server)
            .await;

        let response = client(&server).call_tool("nope", json!({})).await.unwrap();

        assert!(!response.is_success());
        assert_eq!(
            response.error(),
            Some("JSON-RPC error -32601: Method not found")
        );
    }

    #[tokio::test]
    async fn test_tool_error_flag_becomes_failed_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(reply_with(json!({
                "content": [{"type": "text", "text": "unknown drug"}],
                "isError": true
            })))
            .mount(&server)
            .await;

        let response = client(&server).call_tool("lookup", json!({})).await.unwrap();

        assert!(!response.is_success());
        assert_eq!(response.error(), Some("unknown drug"));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("warming up"))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(reply_with(text_content("ok")))
            .mount(&server)
            .await;

        let response = client(&server).call_tool("lookup", json!({})).await.unwrap();

        assert!(response.is_success());
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such endpoint"))
            .expect(1)
            .mount(&server)
            .await;

        let response = client(&server).call_tool("lookup", json!({})).await.unwrap();

        assert!(!response.is_success());
        assert_eq!(response.error(), Some("HTTP 404: no such endpoint"));
    }

    #[tokio::test]
    async fn test_event_stream_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(|request: &Request| {
                let envelope = json!({
                    "jsonrpc": "2.0",
                    "id": request_id(request),
                    "result": {"content": [{"type": "text", "text": "streamed"}]}
                });
                let body = format!(
                    "event: message\ndata: {{\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}}\n\nevent: message\ndata: {envelope}\n\n"
                );
                ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
            })
            .mount(&server)
            .await;

        let response = client(&server).call_tool("lookup", json!({})).await.unwrap();
        assert_eq!(response.text().as_deref(), Some("streamed"));
    }

    #[tokio::test]
    async fn test_initialize_handshake_sets_session_header() {
        let server = MockServer::start().await;
        Mock::given(body_partial_json(json!({"method": "initialize"})))
            .respond_with(|request: &Request| {
                ResponseTemplate::new(200)
                    .insert_header("Mcp-Session-Id", "session-42")
                    .set_body_json(json!({
                        "jsonrpc": "2.0",
                        "id": request_id(request),
                        "result": {"serverInfo": {"name": "drug-db"}}
                    }))
            })
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(body_partial_json(json!({"method": "notifications/initialized"})))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(body_partial_json(json!({"method": "tools/call"})))
            .and(header("Mcp-Session-Id", "session-42"))
            .respond_with(reply_with(text_content("ok")))
            .expect(2)
            .mount(&server)
            .await;

        let client = client(&server).with_initialize(true);
        client.call_tool("lookup", json!({})).await.unwrap();
        client.call_tool("lookup", json!({})).await.unwrap();

        assert_eq!(client.mcp_session_id(), Some("session-42"));
    }

    #[tokio::test]
    async fn test_list_tools() {
        let server = MockServer::start().await;
        Mock::given(body_partial_json(json!({"method": "tools/list"})))
            .respond_with(reply_with(json!({
                "tools": [{
                    "name": "lookup",
                    "description": "Look up a drug",
                    "inputSchema": {"type": "object", "properties": {"drug": {"type": "string"}}}
                }]
            })))
            .mount(&server)
            .await;

        let tools = client(&server).list_tools().await.unwrap();

        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "lookup");
        assert_eq!(tools[0].parameter_schema["properties"]["drug"]["type"], "string");
    }

    #[tokio::test]
    async fn test_session_is_lazy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(reply_with(text_content("ok")))
            .mount(&server)
            .await;

        let client = client(&server);
        assert!(!client.is_connected().await);

        client.call_tool("lookup", json!({})).await.unwrap();
        assert!(client.is_connected().await);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_rejects_later_calls() {
        let server = MockServer::start().await;
        let client = client(&server);

        client.close().await;
        client.close().await;

        let err = client.call_tool("lookup", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_close_cancels_in_flight_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let client = Arc::new(client(&server));
        let pending = {
            let client = client.clone();
            tokio::spawn(async move { client.call_tool("lookup", json!({})).await })
        };

        tokio::time::sleep(Duration::from_millis(200)).await;
        let started = Instant::now();
        client.close().await;

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(ToolError::Cancelled { .. })));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_health_check_healthy_reports_tool_count() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(reply_with(json!({"tools": [{"name": "a"}, {"name": "b"}]})))
            .mount(&server)
            .await;

        let status = client(&server).health_check(Duration::from_secs(2)).await;

        assert_eq!(status.status, HealthState::Healthy);
        assert_eq!(status.tool_count, Some(2));
    }

    #[tokio::test]
    async fn test_health_check_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let started = Instant::now();
        let status = client(&server)
            .health_check(Duration::from_millis(300))
            .await;

        assert_eq!(status.status, HealthState::Timeout);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_health_check_unreachable_host() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = JsonRpcToolClient::new(
            "drug_db",
            format!("http://127.0.0.1:{port}/mcp"),
            SessionOptions::default(),
        )
        .unwrap();

        let timeout = Duration::from_secs(2);
        let started = Instant::now();
        let status = client.health_check(timeout).await;

        assert_eq!(status.status, HealthState::Unavailable);
        assert!(status.error.is_some());
        assert!(started.elapsed() < timeout + PROBE_GRACE);
    }

    #[tokio::test]
    async fn test_health_check_rate_limited_is_unhealthy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
            .expect(1)
            .mount(&server)
            .await;

        let status = client(&server).health_check(Duration::from_secs(2)).await;

        assert_eq!(status.status, HealthState::Unhealthy);
        assert_eq!(status.error.as_deref(), Some("rate limited (HTTP 429)"));
    }
}
