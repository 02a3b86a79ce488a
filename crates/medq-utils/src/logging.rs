//! Logging and tracing utilities

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing subscriber with default configuration
///
/// Honours `RUST_LOG`; falls back to `info`. Calling it twice is harmless.
pub fn init_tracing() {
    init_tracing_with("info", false);
}

/// Initialize tracing subscriber emitting one JSON object per event
pub fn init_json_tracing() {
    init_tracing_with("info", true);
}

/// Initialize tracing with an explicit fallback filter
///
/// Events go to stderr so stdout stays free for command output.
///
/// # Arguments
///
/// * `default_directive` - Filter used when `RUST_LOG` is unset or invalid
/// * `json` - Emit JSON lines instead of human-readable text
pub fn init_tracing_with(default_directive: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let registry = tracing_subscriber::registry().with(filter);

    let _ = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
}
