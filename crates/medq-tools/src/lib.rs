//! Resilient tool clients for medq
//!
//! This crate lets calling code invoke named remote tools through one
//! interface, whatever protocol the backend speaks:
//! - JSON-RPC 2.0 over streamable HTTP ([`JsonRpcToolClient`])
//! - Plain REST, one resource per tool ([`RestToolClient`])
//! - Bounded retries with jittered exponential backoff ([`RetryStrategy`])
//! - Concurrent health probing ([`HealthAggregator`])
//!
//! # Example
//!
//! ```no_run
//! use medq_tools::{ToolClientManager, ToolsConfig};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Load configuration from MEDQ_* environment variables
//! let config = ToolsConfig::from_env()?;
//! let manager = ToolClientManager::from_config(&config)?;
//!
//! let response = manager
//!     .call_tool("drug_db", "search_drugs", json!({"query": "metformin"}))
//!     .await?;
//! println!("{:?}", response.text());
//!
//! let report = manager.health_report().await;
//! println!("{}/{} backends healthy", report.healthy_count(), report.statuses.len());
//!
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod health;
pub mod retry;

// Re-export commonly used types
pub use client::manager::{DiscoveredTool, ToolClientManager};
pub use client::session::SessionOptions;
pub use client::{ArcToolClient, JsonRpcToolClient, RestToolClient, ToolClient};
pub use config::{BackendConfig, BackendKind, RetrySettings, ToolsConfig};
pub use health::{HealthAggregator, HealthReport};
pub use medq_core::{
    HealthState, HealthStatus, Result, RetryConfig, ToolError, ToolMetadata, ToolResponse,
};
pub use retry::RetryStrategy;
