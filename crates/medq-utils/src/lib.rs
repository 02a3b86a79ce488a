//! Shared utilities for medq
//!
//! This crate provides common functionality used across the medq workspace:
//! tracing setup and typed parsing of environment-style settings.

pub mod env;
pub mod logging;

pub use env::{EnvError, EnvSource};
pub use logging::{init_json_tracing, init_tracing, init_tracing_with};
