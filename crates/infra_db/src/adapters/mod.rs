//! Port Adapters
//!
//! PostgreSQL implementations of the sync ports. Each adapter:
//! - Implements the port trait from `domain_sync` or `domain_mapping`
//! - Uses the repository layer for database operations
//! - Translates `DatabaseError` into `PortError`
//!
//! # Usage
//!
//! ```rust,ignore
//! use infra_db::adapters::PgIdempotencyLedger;
//! use domain_sync::WebhookIdempotencyGuard;
//!
//! let guard = WebhookIdempotencyGuard::new(Arc::new(PgIdempotencyLedger::new(pool)));
//! ```

pub mod connections;
pub mod entity_links;
pub mod idempotency;
pub mod mapping_rules;

pub use connections::PgConnectionStore;
pub use entity_links::PgEntityLinkStore;
pub use idempotency::PgIdempotencyLedger;
pub use mapping_rules::PgMappingRuleStore;

use std::time::Instant;

use core_kernel::{AdapterHealth, HealthCheckResult};
use sqlx::PgPool;

/// Health check shared by the adapters: a `SELECT 1` round trip
pub(crate) async fn check_pool(pool: &PgPool, adapter_id: &str) -> HealthCheckResult {
    let start = Instant::now();
    let result = sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await;
    let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    match result {
        Ok(_) => HealthCheckResult::healthy(adapter_id, latency_ms),
        Err(e) => HealthCheckResult::with_status(
            adapter_id,
            AdapterHealth::Unhealthy,
            latency_ms,
            format!("Database error: {}", e),
        ),
    }
}
