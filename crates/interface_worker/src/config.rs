//! Worker configuration
//!
//! Read from environment variables prefixed with `CRM_SYNC_`, for example
//! `CRM_SYNC_DATABASE_URL` or `CRM_SYNC_CRM_CALL_TIMEOUT_MS`. Unset values
//! fall back to the defaults below.

use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use domain_sync::SyncConfig;

use crate::error::WorkerError;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "CRM_SYNC";

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Worker configuration
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// PostgreSQL connection string
    pub database_url: String,
    /// Maximum connections in the pool
    pub db_max_connections: u32,
    /// Apply the bundled migrations at startup
    pub run_migrations: bool,
    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
    pub log_format: LogFormat,
    /// Budget for a single CRM call
    pub crm_call_timeout_ms: u64,
    pub republish_inbound_updates: bool,
    pub skip_empty_payloads: bool,
    /// How long processed webhook keys are kept
    pub idempotency_retention_days: u32,
    /// Time between retention sweeps
    pub retention_sweep_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let sync = SyncConfig::default();
        Self {
            database_url: "postgres://localhost/crm_sync".to_string(),
            db_max_connections: 10,
            run_migrations: false,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            crm_call_timeout_ms: sync.crm_call_timeout_ms(),
            republish_inbound_updates: sync.republish_inbound_updates,
            skip_empty_payloads: sync.skip_empty_payloads,
            idempotency_retention_days: 30,
            retention_sweep_interval_secs: 3600,
        }
    }
}

// The database URL carries credentials
impl fmt::Debug for WorkerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerConfig")
            .field("db_max_connections", &self.db_max_connections)
            .field("run_migrations", &self.run_migrations)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("crm_call_timeout_ms", &self.crm_call_timeout_ms)
            .field("republish_inbound_updates", &self.republish_inbound_updates)
            .field("skip_empty_payloads", &self.skip_empty_payloads)
            .field("idempotency_retention_days", &self.idempotency_retention_days)
            .field("retention_sweep_interval_secs", &self.retention_sweep_interval_secs)
            .finish_non_exhaustive()
    }
}

impl WorkerConfig {
    /// Loads configuration from the environment
    pub fn from_env() -> Result<Self, WorkerError> {
        Self::load(
            config::Config::builder()
                .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true)),
        )
    }

    /// Loads configuration from an arbitrary builder, then validates it
    pub fn load(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, WorkerError> {
        let config: WorkerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values no component can work with
    pub fn validate(&self) -> Result<(), WorkerError> {
        if self.database_url.trim().is_empty() {
            return Err(WorkerError::invalid_config("database_url is empty"));
        }
        if self.db_max_connections == 0 {
            return Err(WorkerError::invalid_config("db_max_connections must be at least 1"));
        }
        if self.crm_call_timeout_ms == 0 {
            return Err(WorkerError::invalid_config("crm_call_timeout_ms must be positive"));
        }
        if self.idempotency_retention_days == 0 {
            return Err(WorkerError::invalid_config(
                "idempotency_retention_days must be at least 1",
            ));
        }
        if self.retention_sweep_interval_secs == 0 {
            return Err(WorkerError::invalid_config(
                "retention_sweep_interval_secs must be positive",
            ));
        }
        Ok(())
    }

    /// The orchestrator settings carried by this configuration
    pub fn to_sync_config(&self) -> SyncConfig {
        SyncConfig::default()
            .with_crm_call_timeout(Duration::from_millis(self.crm_call_timeout_ms))
            .with_republish_inbound_updates(self.republish_inbound_updates)
            .with_skip_empty_payloads(self.skip_empty_payloads)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.idempotency_retention_days))
    }

    pub fn retention_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.retention_sweep_interval_secs)
    }
}
