//! CRM Sync Worker
//!
//! The process-level pieces around the sync engine: configuration loading,
//! tracing setup, the startup routine that wires the components, and the
//! idempotency retention sweeper.
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_worker::{SyncRuntime, WorkerConfig};
//!
//! let config = WorkerConfig::from_env()?;
//! let runtime = SyncRuntime::build(config.to_sync_config(), ports, clients);
//! runtime.bus().publish(&event).await;
//! ```

pub mod config;
pub mod error;
pub mod retention;
pub mod runtime;
pub mod telemetry;

pub use config::{LogFormat, WorkerConfig, ENV_PREFIX};
pub use error::WorkerError;
pub use retention::RetentionSweeper;
pub use runtime::SyncRuntime;
pub use telemetry::init_tracing;
