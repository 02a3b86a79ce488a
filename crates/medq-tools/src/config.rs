//! Configuration for tool backends
//!
//! Loaded from the environment (`MEDQ_*` variables) or from a JSON file
//! with `${VAR}` expansion.
//!
//! # Example
//!
//! ```json
//! {
//!   "backends": {
//!     "drug_db": {
//!       "transport": "jsonrpc",
//!       "url": "http://localhost:8001/mcp",
//!       "initialize": true
//!     },
//!     "literature": {
//!       "transport": "rest",
//!       "url": "${LITERATURE_URL}",
//!       "headers": {"X-Api-Key": "$LITERATURE_KEY"},
//!       "timeout_secs": 10
//!     }
//!   },
//!   "retry": {"maxRetries": 5, "baseDelayMs": 500}
//! }
//! ```

use crate::client::session::{DEFAULT_MAX_RESPONSE_BYTES, SessionOptions};
use crate::client::{ArcToolClient, JsonRpcToolClient, RestToolClient};
use medq_core::{Result, RetryConfig, ToolError};
use medq_utils::{EnvError, EnvSource};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Backends configured when `MEDQ_BACKENDS` is not set
pub const DEFAULT_BACKENDS: [&str; 2] = ["drug_db", "literature"];

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;

/// Wire protocol spoken by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// JSON-RPC 2.0 over streamable HTTP
    JsonRpc,
    /// One REST resource per tool
    Rest,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jsonrpc" | "json-rpc" | "mcp" => Ok(Self::JsonRpc),
            "rest" | "http" => Ok(Self::Rest),
            other => Err(format!("unknown transport '{other}' (expected jsonrpc or rest)")),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::JsonRpc => "jsonrpc",
            Self::Rest => "rest",
        })
    }
}

/// Backend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum BackendConfig {
    /// JSON-RPC streamable-HTTP transport
    #[serde(rename = "jsonrpc")]
    JsonRpc {
        /// Endpoint URL
        url: String,

        /// HTTP headers
        #[serde(default)]
        headers: HashMap<String, String>,

        /// Timeout in seconds
        #[serde(default = "default_timeout")]
        timeout_secs: u64,

        /// Perform the MCP `initialize` handshake before the first call
        #[serde(default)]
        initialize: bool,
    },

    /// REST transport
    Rest {
        /// Base URL
        url: String,

        /// HTTP headers
        #[serde(default)]
        headers: HashMap<String, String>,

        /// Timeout in seconds
        #[serde(default = "default_timeout")]
        timeout_secs: u64,
    },
}

impl BackendConfig {
    /// Backend with the given transport and no extra headers
    pub fn new(kind: BackendKind, url: impl Into<String>, timeout_secs: u64) -> Self {
        let url = url.into();
        match kind {
            BackendKind::JsonRpc => Self::JsonRpc {
                url,
                headers: HashMap::new(),
                timeout_secs,
                initialize: false,
            },
            BackendKind::Rest => Self::Rest {
                url,
                headers: HashMap::new(),
                timeout_secs,
            },
        }
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::JsonRpc { .. } => BackendKind::JsonRpc,
            Self::Rest { .. } => BackendKind::Rest,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::JsonRpc { url, .. } | Self::Rest { url, .. } => url,
        }
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        match self {
            Self::JsonRpc { headers, .. } | Self::Rest { headers, .. } => headers,
        }
    }

    pub fn timeout(&self) -> Duration {
        match self {
            Self::JsonRpc { timeout_secs, .. } | Self::Rest { timeout_secs, .. } => {
                Duration::from_secs(*timeout_secs)
            }
        }
    }

    /// Transport settings for the HTTP session
    pub fn session_options(&self, max_response_bytes: usize) -> SessionOptions {
        SessionOptions {
            timeout: self.timeout(),
            headers: self.headers().clone(),
            max_response_bytes,
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        let url = Url::parse(self.url()).map_err(|e| {
            ToolError::Config(format!("backend '{name}': invalid URL '{}': {e}", self.url()))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ToolError::Config(format!(
                "backend '{name}': unsupported URL scheme '{}'",
                url.scheme()
            )));
        }

        if self.timeout().is_zero() {
            return Err(ToolError::Config(format!(
                "backend '{name}': timeout_secs must be greater than zero"
            )));
        }

        Ok(())
    }

    fn resolve_env_vars(&mut self, env: &EnvSource<'_>) -> Result<()> {
        let (url, headers) = match self {
            Self::JsonRpc { url, headers, .. } | Self::Rest { url, headers, .. } => (url, headers),
        };

        *url = resolve_env_string(url, env)?;
        for value in headers.values_mut() {
            *value = resolve_env_string(value, env)?;
        }

        Ok(())
    }
}

/// Retry policy as written in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
    pub exponential_base: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter: true,
            exponential_base: 2,
        }
    }
}

impl RetrySettings {
    /// Validate into a [`RetryConfig`]
    pub fn to_retry_config(&self) -> Result<RetryConfig> {
        RetryConfig::new(
            self.max_retries,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.jitter,
            self.exponential_base,
        )
    }
}

/// Root tool configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsConfig {
    /// Backend definitions keyed by backend id
    #[serde(default)]
    pub backends: BTreeMap<String, BackendConfig>,

    /// Retry policy shared by all backends
    #[serde(default)]
    pub retry: RetrySettings,

    /// Largest accepted response body
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,

    /// Per-backend health probe timeout
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            backends: BTreeMap::new(),
            retry: RetrySettings::default(),
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
        }
    }
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_response_bytes() -> usize {
    DEFAULT_MAX_RESPONSE_BYTES
}

fn default_probe_timeout() -> u64 {
    DEFAULT_PROBE_TIMEOUT_SECS
}

fn env_error(error: EnvError) -> ToolError {
    ToolError::Config(error.to_string())
}

/// Built-in transport and URL for the well-known backends
fn builtin_backend(name: &str) -> Option<(BackendKind, &'static str)> {
    match name {
        "drug_db" => Some((BackendKind::JsonRpc, "http://localhost:8001/mcp")),
        "literature" => Some((BackendKind::Rest, "http://localhost:8002")),
        _ => None,
    }
}

impl ToolsConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_source(&EnvSource::process())
    }

    /// Load configuration from an environment-style source
    ///
    /// Missing variables fall back to defaults; malformed ones are errors.
    pub fn from_source(env: &EnvSource<'_>) -> Result<Self> {
        let names = env.list("MEDQ_BACKENDS").unwrap_or_else(|| {
            DEFAULT_BACKENDS.iter().map(|name| (*name).to_string()).collect()
        });

        let mut backends = BTreeMap::new();
        for name in names {
            let backend = Self::backend_from_source(&name, env)?;
            backends.insert(name, backend);
        }

        let defaults = RetrySettings::default();
        let retry = RetrySettings {
            max_retries: env
                .parse("MEDQ_MAX_RETRIES")
                .map_err(env_error)?
                .unwrap_or(defaults.max_retries),
            base_delay_ms: env
                .parse("MEDQ_BASE_DELAY_MS")
                .map_err(env_error)?
                .unwrap_or(defaults.base_delay_ms),
            max_delay_ms: env
                .parse("MEDQ_MAX_DELAY_MS")
                .map_err(env_error)?
                .unwrap_or(defaults.max_delay_ms),
            jitter: env
                .parse_bool("MEDQ_RETRY_JITTER")
                .map_err(env_error)?
                .unwrap_or(defaults.jitter),
            exponential_base: env
                .parse("MEDQ_EXPONENTIAL_BASE")
                .map_err(env_error)?
                .unwrap_or(defaults.exponential_base),
        };

        let config = Self {
            backends,
            retry,
            max_response_bytes: env
                .parse("MEDQ_MAX_RESPONSE_BYTES")
                .map_err(env_error)?
                .unwrap_or(DEFAULT_MAX_RESPONSE_BYTES),
            probe_timeout_secs: env
                .parse("MEDQ_HEALTH_TIMEOUT_SECS")
                .map_err(env_error)?
                .unwrap_or(DEFAULT_PROBE_TIMEOUT_SECS),
        };

        config.validate()?;
        Ok(config)
    }

    fn backend_from_source(name: &str, env: &EnvSource<'_>) -> Result<BackendConfig> {
        let prefix = format!("MEDQ_{}", env_key_segment(name));
        let builtin = builtin_backend(name);

        let kind = env
            .parse::<BackendKind>(&format!("{prefix}_TRANSPORT"))
            .map_err(env_error)?
            .or(builtin.map(|(kind, _)| kind))
            .unwrap_or(BackendKind::Rest);

        let url_key = format!("{prefix}_URL");
        let url = env
            .get(&url_key)
            .or_else(|| builtin.map(|(_, url)| url.to_string()))
            .ok_or_else(|| {
                ToolError::Config(format!("{url_key} is required for backend '{name}'"))
            })?;

        let timeout_secs = env
            .parse(&format!("{prefix}_TIMEOUT_SECS"))
            .map_err(env_error)?
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let mut backend = BackendConfig::new(kind, url, timeout_secs);
        if let BackendConfig::JsonRpc { initialize, .. } = &mut backend {
            *initialize = env
                .parse_bool(&format!("{prefix}_INITIALIZE"))
                .map_err(env_error)?
                .unwrap_or(false);
        }

        Ok(backend)
    }

    /// Load configuration from a JSON file
    ///
    /// `${VAR}` and `$VAR` references in URLs and header values are expanded
    /// from the process environment.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use medq_tools::config::ToolsConfig;
    /// let config = ToolsConfig::from_file("medq.json")?;
    /// # Ok::<(), medq_tools::ToolError>(())
    /// ```
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Self::from_file_with(path, &EnvSource::process())
    }

    /// Load configuration from a JSON file, expanding variables from `env`
    pub fn from_file_with(path: impl AsRef<std::path::Path>, env: &EnvSource<'_>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ToolError::Config(format!("Failed to read config file: {e}")))?;

        let mut config: ToolsConfig = serde_json::from_str(&content)
            .map_err(|e| ToolError::Config(format!("Failed to parse config file: {e}")))?;

        for backend in config.backends.values_mut() {
            backend.resolve_env_vars(env)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check every backend and the retry policy
    pub fn validate(&self) -> Result<()> {
        for (name, backend) in &self.backends {
            if name.trim().is_empty() {
                return Err(ToolError::Config("backend name must not be empty".to_string()));
            }
            backend.validate(name)?;
        }

        if self.max_response_bytes == 0 {
            return Err(ToolError::Config(
                "max_response_bytes must be greater than zero".to_string(),
            ));
        }

        if self.probe_timeout_secs == 0 {
            return Err(ToolError::Config(
                "probe_timeout_secs must be greater than zero".to_string(),
            ));
        }

        self.retry_config().map(|_| ())
    }

    pub fn retry_config(&self) -> Result<RetryConfig> {
        self.retry.to_retry_config()
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn backend(&self, name: &str) -> Result<&BackendConfig> {
        self.backends
            .get(name)
            .ok_or_else(|| ToolError::Config(format!("unknown backend '{name}'")))
    }

    /// Build the client for one backend without touching the network
    pub fn build_client(&self, name: &str) -> Result<ArcToolClient> {
        let backend = self.backend(name)?;
        let retry = self.retry_config()?;

        let client: ArcToolClient = match backend.kind() {
            BackendKind::JsonRpc => Arc::new(JsonRpcToolClient::from_config(
                name,
                backend,
                retry,
                self.max_response_bytes,
            )?),
            BackendKind::Rest => Arc::new(RestToolClient::from_config(
                name,
                backend,
                retry,
                self.max_response_bytes,
            )?),
        };

        Ok(client)
    }

    /// Build clients for every configured backend
    pub fn build_clients(&self) -> Result<BTreeMap<String, ArcToolClient>> {
        self.backends
            .keys()
            .map(|name| self.build_client(name).map(|client| (name.clone(), client)))
            .collect()
    }
}

/// Backend name as it appears in an environment key: `my-db.v2` becomes `MY_DB_V2`
fn env_key_segment(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Resolve environment variable references in strings
///
/// Supports `${VAR}` and `$VAR` syntax. A reference to an unset variable is
/// a configuration error.
pub fn resolve_env_string(s: &str, env: &EnvSource<'_>) -> Result<String> {
    let pattern = regex::Regex::new(
        r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)",
    )
    .map_err(|e| ToolError::Config(format!("Invalid pattern: {e}")))?;

    let mut result = String::with_capacity(s.len());
    let mut last = 0;

    for cap in pattern.captures_iter(s) {
        let Some(whole) = cap.get(0) else { continue };
        let Some(var) = cap.get(1).or_else(|| cap.get(2)) else {
            continue;
        };

        let value = env.get(var.as_str()).ok_or_else(|| {
            ToolError::Config(format!("Environment variable not found: {}", var.as_str()))
        })?;

        result.push_str(&s[last..whole.start()]);
        result.push_str(&value);
        last = whole.end();
    }

    result.push_str(&s[last..]);
    Ok(result)
}
