//! Client manager coordinating every configured backend

use super::ArcToolClient;
use crate::config::ToolsConfig;
use crate::health::{HealthAggregator, HealthReport};
use futures::future::join_all;
use medq_core::{Result, ToolError, ToolMetadata, ToolResponse};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

/// A tool together with the backend exposing it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredTool {
    pub backend: String,
    pub metadata: ToolMetadata,
}

/// Owns one client per backend
///
/// The manager handles:
/// - Routing tool calls to the right backend
/// - Tool discovery across all backends, skipping the ones that fail
/// - Aggregated health probing
/// - Closing every client on shutdown
pub struct ToolClientManager {
    clients: BTreeMap<String, ArcToolClient>,
    health: HealthAggregator,
}

impl ToolClientManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self {
            clients: BTreeMap::new(),
            health: HealthAggregator::new(),
        }
    }

    /// Build clients for every backend in `config`
    ///
    /// No connection is made; sessions open on first use.
    pub fn from_config(config: &ToolsConfig) -> Result<Self> {
        let mut manager = Self::new();

        for (name, client) in config.build_clients()? {
            manager.register(name, client, config.probe_timeout());
        }

        info!("Configured {} tool backends", manager.clients.len());
        Ok(manager)
    }

    /// Add a client, replacing any previous client for the same backend
    pub fn register(&mut self, name: impl Into<String>, client: ArcToolClient, probe_timeout: Duration) {
        let name = name.into();
        self.health.register(name.clone(), client.clone(), probe_timeout);
        self.clients.insert(name, client);
    }

    pub fn get_client(&self, backend: &str) -> Option<ArcToolClient> {
        self.clients.get(backend).cloned()
    }

    /// Registered backend ids, sorted
    pub fn backends(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }

    /// Call a tool on the given backend
    ///
    /// # Arguments
    ///
    /// * `backend` - Backend id
    /// * `tool` - Name of the tool to call
    /// * `params` - Tool parameters as a JSON object
    pub async fn call_tool(&self, backend: &str, tool: &str, params: Value) -> Result<ToolResponse> {
        let client = self
            .clients
            .get(backend)
            .ok_or_else(|| ToolError::Config(format!("unknown backend '{backend}'")))?;

        client.call_tool(tool, params).await
    }

    /// Discover tools from all backends concurrently
    ///
    /// Backends that fail are logged and skipped.
    pub async fn discover_tools(&self) -> Vec<DiscoveredTool> {
        let listings = self.clients.iter().map(|(name, client)| async move {
            (name, client.list_tools().await)
        });

        let mut all_tools = Vec::new();
        for (name, listing) in join_all(listings).await {
            match listing {
                Ok(tools) => {
                    info!("Discovered {} tools from backend: {}", tools.len(), name);
                    all_tools.extend(tools.into_iter().map(|metadata| DiscoveredTool {
                        backend: name.clone(),
                        metadata,
                    }));
                }
                Err(e) => {
                    warn!("Failed to list tools from {}: {}. Continuing without it.", name, e);
                }
            }
        }

        all_tools
    }

    /// Probe every backend
    pub async fn health_report(&self) -> HealthReport {
        self.health.check_all().await
    }

    /// Close every client
    pub async fn shutdown(&self) {
        join_all(self.clients.values().map(|client| client.close())).await;
        info!("Closed {} tool clients", self.clients.len());
    }
}

impl Default for ToolClientManager {
    fn default() -> Self {
        Self::new()
    }
}
