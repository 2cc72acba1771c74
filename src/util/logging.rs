//! Logging initialization and configuration.

use crate::config::LogFormat;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Dependencies whose debug output drowns out ours.
const QUIET_TARGETS: [&str; 3] = ["hyper=warn", "hyper_util=warn", "notify=warn"];

/// Build the log filter for `level`.
///
/// `RUST_LOG` wins when set and valid. Otherwise `level` applies to everything
/// except a few chatty dependencies, which are capped at `warn`.
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut directives = vec![level.to_lowercase()];
        directives.extend(QUIET_TARGETS.iter().map(|t| t.to_string()));
        EnvFilter::new(directives.join(","))
    })
}

/// Initialize the logging system.
///
/// # Arguments
///
/// * `level` - Log level filter (e.g., "info", "debug")
/// * `format` - Log output format (json or pretty)
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(level: &str, format: &LogFormat) -> Result<(), TryInitError> {
    let registry = tracing_subscriber::registry().with(build_filter(level));

    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
    }
}
