//! Tracing subscriber setup

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;
use crate::error::WorkerError;

/// Builds the filter: `RUST_LOG` when set, else `log_level`, else `info`
pub fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global tracing subscriber
///
/// Fails if a subscriber is already installed.
pub fn init_tracing(log_level: &str, format: LogFormat) -> Result<(), WorkerError> {
    let registry = tracing_subscriber::registry().with(env_filter(log_level));

    let result = match format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init(),
    };

    result.map_err(|e| WorkerError::Telemetry(e.to_string()))
}
