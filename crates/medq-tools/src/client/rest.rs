//! Plain REST backends
//!
//! Each tool is a resource under `{base}/tools/{name}` invoked with `POST`
//! and a JSON object body. Discovery and health use `GET {base}/tools` and
//! `GET {base}/health`.

use super::session::{Classified, HttpReply, HttpSession, SessionOptions};
use super::{
    CallOutcome, ToolClient, elapsed_ms, health_from_error, into_response, prepare_params,
};
use crate::config::BackendConfig;
use crate::health::PROBE_GRACE;
use crate::retry::RetryStrategy;
use async_trait::async_trait;
use medq_core::{HealthStatus, Result, RetryConfig, ToolError, ToolMetadata, ToolResponse};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// Body of `GET {base}/tools`
#[derive(Deserialize)]
#[serde(untagged)]
enum ToolListing {
    Wrapped { tools: Vec<ToolMetadata> },
    Bare(Vec<ToolMetadata>),
}

impl ToolListing {
    fn into_tools(self) -> Vec<ToolMetadata> {
        match self {
            Self::Wrapped { tools } | Self::Bare(tools) => tools,
        }
    }
}

/// Body of `GET {base}/health`
#[derive(Deserialize)]
struct HealthBody {
    status: String,
    #[serde(default)]
    tools_count: Option<usize>,
}

/// Tool client for REST backends
pub struct RestToolClient {
    backend: String,
    base: Url,
    session: HttpSession,
    retry: RetryConfig,
}

impl RestToolClient {
    /// Create a new REST tool client
    ///
    /// Fails with [`ToolError::Config`] when `base_url` is not an absolute
    /// URL that can carry a path.
    pub fn new(
        backend: impl Into<String>,
        base_url: &str,
        options: SessionOptions,
    ) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| ToolError::Config(format!("Invalid base URL '{base_url}': {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ToolError::Config(format!(
                "Invalid base URL '{base_url}': cannot carry a path"
            )));
        }

        Ok(Self {
            backend: backend.into(),
            session: HttpSession::new(base.as_str(), options)?,
            base,
            retry: RetryConfig::default(),
        })
    }

    /// Use a custom default retry policy
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
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
            BackendConfig::Rest { url, .. } => Ok(Self::new(
                backend,
                url,
                config.session_options(max_response_bytes),
            )?
            .with_retry_config(retry)),
            BackendConfig::JsonRpc { .. } => Err(ToolError::Config(format!(
                "backend '{backend}' is not configured for the rest transport"
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

    /// Append path segments to the base URL
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn parse_json(&self, reply: &HttpReply) -> Result<Value> {
        if reply.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }

        serde_json::from_slice(&reply.body).map_err(|e| {
            ToolError::validation_with_payload(
                self.url(),
                format!("response is not valid JSON: {e}"),
                reply.preview(),
            )
        })
    }

    /// One `POST {base}/tools/{name}` attempt
    async fn call_once(&self, endpoint: &Url, params: &Value) -> Result<CallOutcome> {
        debug!("POST {}", endpoint);

        let reply = self
            .session
            .send(|client| client.post(endpoint.clone()).json(params), None)
            .await?;

        match self.session.classify(reply)? {
            Classified::Success(reply) => self.parse_json(&reply).map(CallOutcome::Data),
            Classified::Rejected(message) => Ok(CallOutcome::Failed(message)),
        }
    }

    /// One `GET {base}/tools` attempt
    async fn fetch_tools(&self, endpoint: &Url) -> Result<Vec<ToolMetadata>> {
        let reply = self
            .session
            .send(|client| client.get(endpoint.clone()), None)
            .await?;

        let reply = match self.session.classify(reply)? {
            Classified::Success(reply) => reply,
            Classified::Rejected(message) => {
                return Err(ToolError::validation(
                    self.url(),
                    format!("tool listing rejected: {message}"),
                ));
            }
        };

        serde_json::from_slice::<ToolListing>(&reply.body)
            .map(ToolListing::into_tools)
            .map_err(|e| {
                ToolError::validation_with_payload(
                    self.url(),
                    format!("Failed to parse tools: {e}"),
                    reply.preview(),
                )
            })
    }

    async fn probe(&self, timeout: Duration, started: Instant) -> HealthStatus {
        let endpoint = self.endpoint(&["health"]);
        let reply = match self
            .session
            .send(|client| client.get(endpoint), Some(timeout))
            .await
        {
            Ok(reply) => reply,
            Err(e) => return health_from_error(&e, elapsed_ms(started)),
        };
        let latency = elapsed_ms(started);

        if !reply.status.is_success() {
            let message = if reply.status == StatusCode::TOO_MANY_REQUESTS {
                "rate limited (HTTP 429)".to_string()
            } else {
                format!("HTTP {}: {}", reply.status.as_u16(), reply.preview())
            };
            return HealthStatus::unhealthy(Some(latency), message);
        }

        match serde_json::from_slice::<HealthBody>(&reply.body) {
            Ok(body) if body.status == "ok" => HealthStatus::healthy(latency, body.tools_count),
            Ok(body) => HealthStatus::unhealthy(
                Some(latency),
                format!("backend reported status '{}'", body.status),
            ),
            Err(e) => HealthStatus::unhealthy(
                Some(latency),
                format!("unexpected health payload: {e}"),
            ),
        }
    }
}

#[async_trait]
impl ToolClient for RestToolClient {
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
        let endpoint = self.endpoint(&["tools", name]);

        let strategy = RetryStrategy::new(retry.unwrap_or_else(|| self.retry.clone()));
        let started = Instant::now();
        let operation = format!("{}/{}", self.backend, name);

        let outcome = strategy
            .execute(&operation, || self.call_once(&endpoint, &params))
            .await?;

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
        let endpoint = self.endpoint(&["tools"]);
        let operation = format!("{}/tools", self.backend);

        strategy
            .execute(&operation, || self.fetch_tools(&endpoint))
            .await
    }

    async fn close(&self) {
        if self.session.close().await {
            info!("Closed tool client {} ({})", self.backend, self.url());
        }
    }
}
