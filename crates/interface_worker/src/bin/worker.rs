//! CRM Sync Worker Binary
//!
//! Connects to PostgreSQL, checks the sync schema and adapters, and keeps the
//! webhook idempotency table within its retention window until stopped.
//!
//! # Usage
//!
//! ```bash
//! CRM_SYNC_DATABASE_URL=postgres://... cargo run --bin crm-sync-worker
//! ```
//!
//! # Environment Variables
//!
//! * `CRM_SYNC_DATABASE_URL` - PostgreSQL connection string
//! * `CRM_SYNC_DB_MAX_CONNECTIONS` - Pool size (default: 10)
//! * `CRM_SYNC_RUN_MIGRATIONS` - Apply bundled migrations at startup (default: false)
//! * `CRM_SYNC_LOG_LEVEL` - Log filter when `RUST_LOG` is unset (default: info)
//! * `CRM_SYNC_LOG_FORMAT` - `pretty` or `json` (default: pretty)
//! * `CRM_SYNC_IDEMPOTENCY_RETENTION_DAYS` - Days to keep webhook keys (default: 30)
//! * `CRM_SYNC_RETENTION_SWEEP_INTERVAL_SECS` - Seconds between sweeps (default: 3600)

use anyhow::Context;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::watch;

use core_kernel::{HealthCheckable, RegistryHealthReport};
use domain_sync::WebhookIdempotencyGuard;
use infra_db::{
    create_pool, run_migrations, verify_schema, DatabaseConfig, PgConnectionStore,
    PgEntityLinkStore, PgIdempotencyLedger, PgMappingRuleStore,
};
use interface_worker::{init_tracing, RetentionSweeper, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = WorkerConfig::from_env().context("loading worker configuration")?;
    init_tracing(&config.log_level, config.log_format)?;

    tracing::info!(config = ?config, "Starting CRM sync worker");

    let pool = create_pool(
        DatabaseConfig::new(&config.database_url).max_connections(config.db_max_connections),
    )
    .await
    .context("connecting to database")?;

    if config.run_migrations {
        run_migrations(&pool).await.context("running migrations")?;
    }
    verify_schema(&pool).await.context("verifying schema")?;

    let ledger = Arc::new(PgIdempotencyLedger::new(pool.clone()));
    let adapters: Vec<Arc<dyn HealthCheckable>> = vec![
        ledger.clone(),
        Arc::new(PgMappingRuleStore::new(pool.clone())),
        Arc::new(PgEntityLinkStore::new(pool.clone())),
        Arc::new(PgConnectionStore::new(pool.clone())),
    ];
    let health =
        RegistryHealthReport::from_results(join_all(adapters.iter().map(|a| a.health_check())).await);
    if !health.is_operational() {
        anyhow::bail!("adapters unhealthy: {:?}", health.unhealthy_adapters());
    }
    tracing::info!(adapters = health.total_count, "Adapters healthy");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = RetentionSweeper::new(
        WebhookIdempotencyGuard::new(ledger),
        config.retention(),
        config.retention_sweep_interval(),
    )
    .spawn(shutdown_rx);

    shutdown_signal().await;
    // Receivers only fail to get this if the sweeper already exited
    let _ = shutdown_tx.send(true);
    sweeper.await.context("retention sweeper task")?;

    pool.close().await;
    tracing::info!("Worker shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
