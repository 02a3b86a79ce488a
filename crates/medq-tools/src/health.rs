//! Concurrent health probing across backends

use crate::client::{ArcToolClient, elapsed_ms};
use futures::future::join_all;
use medq_core::HealthStatus;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Fixed overhead allowed on top of a probe timeout
pub const PROBE_GRACE: Duration = Duration::from_millis(250);

struct Probe {
    client: ArcToolClient,
    timeout: Duration,
}

/// Probes every registered backend in parallel
#[derive(Default)]
pub struct HealthAggregator {
    probes: BTreeMap<String, Probe>,
}

impl HealthAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend; a second registration under the same id replaces the first
    pub fn register(&mut self, id: impl Into<String>, client: ArcToolClient, timeout: Duration) {
        self.probes.insert(id.into(), Probe { client, timeout });
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// Probe all backends concurrently
    ///
    /// Each probe runs under its own timeout, so the whole check takes about
    /// as long as the slowest backend rather than the sum of all of them.
    pub async fn check_all(&self) -> HealthReport {
        let started = Instant::now();

        let probes = self.probes.iter().map(|(id, probe)| async move {
            // Adapters enforce this deadline themselves; the guard only bounds
            // clients that ignore their timeout.
            let deadline = probe.timeout + PROBE_GRACE;
            let probe_started = Instant::now();

            let status = tokio::time::timeout(deadline, probe.client.health_check(probe.timeout))
                .await
                .unwrap_or_else(|_| HealthStatus::timeout(elapsed_ms(probe_started)));

            if status.is_healthy() {
                debug!("Backend {} is healthy", id);
            } else {
                warn!(
                    "Backend {} is {}: {}",
                    id,
                    status.status,
                    status.error.as_deref().unwrap_or("no detail")
                );
            }

            (id.clone(), status)
        });

        let statuses = join_all(probes).await.into_iter().collect();

        HealthReport {
            statuses,
            elapsed_ms: elapsed_ms(started),
        }
    }
}

/// Outcome of one aggregated health check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub statuses: BTreeMap<String, HealthStatus>,
    pub elapsed_ms: u64,
}

impl HealthReport {
    /// True when every backend is healthy
    pub fn is_healthy(&self) -> bool {
        self.statuses.values().all(HealthStatus::is_healthy)
    }

    pub fn healthy_count(&self) -> usize {
        self.statuses.values().filter(|s| s.is_healthy()).count()
    }

    pub fn get(&self, id: &str) -> Option<&HealthStatus> {
        self.statuses.get(id)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fake client shared by the aggregator and manager tests

    use crate::client::ToolClient;
    use async_trait::async_trait;
    use medq_core::{
        HealthStatus, Result, RetryConfig, ToolError, ToolMetadata, ToolResponse,
    };
    use serde_json::{Map, Value, json};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    pub struct FakeClient {
        pub name: String,
        pub delay: Duration,
        pub status: HealthStatus,
        pub tools: Option<Vec<ToolMetadata>>,
        pub closed: AtomicBool,
    }

    impl FakeClient {
        pub fn healthy(name: &str, delay: Duration) -> Self {
            Self {
                name: name.to_string(),
                delay,
                status: HealthStatus::healthy(1, Some(1)),
                tools: Some(vec![ToolMetadata::new(format!("{name}_tool"), "fake")]),
                closed: AtomicBool::new(false),
            }
        }

        /// Ignores its probe timeout
        pub fn hanging(name: &str) -> Self {
            Self::healthy(name, Duration::from_secs(3600))
        }

        pub fn failing(name: &str) -> Self {
            Self {
                status: HealthStatus::unavailable("connection refused"),
                tools: None,
                ..Self::healthy(name, Duration::ZERO)
            }
        }

        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ToolClient for FakeClient {
        fn backend(&self) -> &str {
            &self.name
        }

        async fn call_tool_with(
            &self,
            name: &str,
            params: Value,
            _retry: Option<RetryConfig>,
        ) -> Result<ToolResponse> {
            Ok(ToolResponse::success(
                json!({"tool": name, "params": params}),
                Map::new(),
            ))
        }

        async fn health_check(&self, _timeout: Duration) -> HealthStatus {
            tokio::time::sleep(self.delay).await;
            self.status.clone()
        }

        async fn list_tools(&self) -> Result<Vec<ToolMetadata>> {
            self.tools
                .clone()
                .ok_or_else(|| ToolError::connection("http://fake", "connection refused"))
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeClient;
    use super::*;
    use medq_core::HealthState;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_empty_aggregator_reports_healthy() {
        let report = HealthAggregator::new().check_all().await;

        assert!(report.statuses.is_empty());
        assert!(report.is_healthy());
    }

    #[tokio::test]
    async fn test_probes_run_concurrently() {
        let mut aggregator = HealthAggregator::new();
        for (id, delay_ms) in [("a", 300), ("b", 300), ("c", 300), ("d", 400)] {
            aggregator.register(
                id,
                Arc::new(FakeClient::healthy(id, Duration::from_millis(delay_ms))),
                Duration::from_secs(2),
            );
        }

        let started = Instant::now();
        let report = aggregator.check_all().await;
        let elapsed = started.elapsed();

        assert_eq!(report.healthy_count(), 4);
        assert!(report.is_healthy());
        assert!(elapsed >= Duration::from_millis(400));
        assert!(elapsed < Duration::from_millis(1000), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn test_misbehaving_client_is_reported_as_timeout() {
        let mut aggregator = HealthAggregator::new();
        aggregator.register(
            "stuck",
            Arc::new(FakeClient::hanging("stuck")),
            Duration::from_millis(100),
        );
        aggregator.register(
            "ok",
            Arc::new(FakeClient::healthy("ok", Duration::ZERO)),
            Duration::from_millis(100),
        );

        let started = Instant::now();
        let report = aggregator.check_all().await;

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(report.get("stuck").unwrap().status, HealthState::Timeout);
        assert_eq!(report.get("ok").unwrap().status, HealthState::Healthy);
        assert!(!report.is_healthy());
        assert_eq!(report.healthy_count(), 1);
    }

    #[tokio::test]
    async fn test_real_adapters_report_healthy_and_unavailable() {
        use crate::client::session::SessionOptions;
        use crate::client::{JsonRpcToolClient, RestToolClient};
        use serde_json::json;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "ok", "tools_count": 2}))
                    .set_delay(Duration::from_millis(50)),
            )
            .mount(&server)
            .await;

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let literature =
            RestToolClient::new("literature", &server.uri(), SessionOptions::default()).unwrap();
        let drug_db = JsonRpcToolClient::new(
            "drug_db",
            format!("http://127.0.0.1:{port}/mcp"),
            SessionOptions::default(),
        )
        .unwrap();

        let timeout = Duration::from_secs(2);
        let mut aggregator = HealthAggregator::new();
        aggregator.register("literature", Arc::new(literature), timeout);
        aggregator.register("drug_db", Arc::new(drug_db), timeout);

        let started = Instant::now();
        let report = aggregator.check_all().await;

        assert!(started.elapsed() < timeout + PROBE_GRACE);
        assert_eq!(report.get("literature").unwrap().status, HealthState::Healthy);
        assert_eq!(report.get("literature").unwrap().tool_count, Some(2));
        assert_eq!(report.get("drug_db").unwrap().status, HealthState::Unavailable);
        assert!(!report.is_healthy());
        assert_eq!(report.healthy_count(), 1);
    }

    #[tokio::test]
    async fn test_report_serializes_states_lowercase() {
        let mut aggregator = HealthAggregator::new();
        aggregator.register(
            "down",
            Arc::new(FakeClient::failing("down")),
            Duration::from_secs(1),
        );

        let report = aggregator.check_all().await;
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["statuses"]["down"]["status"], "unavailable");
        assert_eq!(aggregator.len(), 1);
    }
}
