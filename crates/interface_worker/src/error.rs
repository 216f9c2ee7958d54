//! Worker error types

use thiserror::Error;

use infra_db::DatabaseError;

/// Errors raised while starting or running the worker
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Configuration could not be loaded or deserialized
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration loaded but holds an unusable value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The tracing subscriber could not be installed
    #[error("Telemetry setup failed: {0}")]
    Telemetry(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl WorkerError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        WorkerError::InvalidConfig(message.into())
    }
}
