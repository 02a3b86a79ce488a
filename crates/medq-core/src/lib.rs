//! Domain model shared by every medq tool client
//!
//! This crate defines the value types that flow between callers and the
//! backend adapters in `medq-tools`. It performs no I/O.

pub mod error;
pub mod health;
pub mod metadata;
pub mod response;
pub mod retry;

pub use error::{Result, ToolError};
pub use health::{HealthState, HealthStatus};
pub use metadata::ToolMetadata;
pub use response::ToolResponse;
pub use retry::{RetryConfig, RetryConfigBuilder};
