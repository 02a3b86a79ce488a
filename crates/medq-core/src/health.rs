//! Backend health snapshots

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse health classification of one backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// Backend answered the probe correctly
    Healthy,
    /// Backend answered, but not with a healthy reply
    Unhealthy,
    /// Backend could not be reached
    Unavailable,
    /// Probe deadline expired
    Timeout,
}

impl HealthState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Unavailable => "unavailable",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of probing one backend
///
/// A fresh snapshot is produced by every probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: HealthState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthStatus {
    pub fn healthy(latency_ms: u64, tool_count: Option<usize>) -> Self {
        Self {
            status: HealthState::Healthy,
            latency_ms: Some(latency_ms),
            tool_count,
            error: None,
        }
    }

    pub fn unhealthy(latency_ms: Option<u64>, error: impl Into<String>) -> Self {
        Self {
            status: HealthState::Unhealthy,
            latency_ms,
            tool_count: None,
            error: Some(error.into()),
        }
    }

    pub fn unavailable(error: impl Into<String>) -> Self {
        Self {
            status: HealthState::Unavailable,
            latency_ms: None,
            tool_count: None,
            error: Some(error.into()),
        }
    }

    pub fn timeout(latency_ms: u64) -> Self {
        Self {
            status: HealthState::Timeout,
            latency_ms: Some(latency_ms),
            tool_count: None,
            error: Some(format!("health probe timed out after {latency_ms}ms")),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthState::Healthy
    }
}
