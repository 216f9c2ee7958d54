//! PostgreSQL Idempotency Ledger
//!
//! Claims rely on the unique `(crm_system, external_event_id)` key: an
//! `INSERT ... ON CONFLICT DO NOTHING RETURNING` reports whether this caller
//! created the row, so exactly one of any number of concurrent claims wins,
//! across processes as well as tasks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, info, instrument};

use core_kernel::{CrmSystem, DomainPort, HealthCheckResult, HealthCheckable, PortError};
use domain_sync::{IdempotencyLedger, IdempotencyOutcome, IdempotencyRecord};

use super::check_pool;
use crate::error::DatabaseError;
use crate::repositories::WebhookEventRepository;

/// `IdempotencyLedger` backed by `crm_webhook_events`
#[derive(Debug, Clone)]
pub struct PgIdempotencyLedger {
    repository: WebhookEventRepository,
    pool: PgPool,
}

impl PgIdempotencyLedger {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: WebhookEventRepository::new(pool.clone()),
            pool,
        }
    }
}

impl DomainPort for PgIdempotencyLedger {}

#[async_trait]
impl HealthCheckable for PgIdempotencyLedger {
    async fn health_check(&self) -> HealthCheckResult {
        check_pool(&self.pool, "postgres-idempotency-ledger").await
    }
}

#[async_trait]
impl IdempotencyLedger for PgIdempotencyLedger {
    #[instrument(skip(self), fields(crm_system = %crm_system))]
    async fn insert_if_absent(
        &self,
        crm_system: CrmSystem,
        external_event_id: &str,
        occurred_at: Option<DateTime<Utc>>,
    ) -> Result<bool, PortError> {
        let inserted = self
            .repository
            .insert_if_absent(crm_system, external_event_id, occurred_at)
            .await?;
        debug!(inserted, "webhook claim attempted");
        Ok(inserted)
    }

    #[instrument(skip(self), fields(crm_system = %crm_system, outcome = %outcome))]
    async fn record_outcome(
        &self,
        crm_system: CrmSystem,
        external_event_id: &str,
        outcome: IdempotencyOutcome,
    ) -> Result<(), PortError> {
        let updated = self
            .repository
            .set_outcome_if_unset(crm_system, external_event_id, outcome)
            .await?;
        if updated > 0 {
            return Ok(());
        }

        // Nothing changed: either the outcome was already set or the key is unknown
        match self.repository.find(crm_system, external_event_id).await? {
            Some(_) => {
                debug!("outcome already recorded");
                Ok(())
            }
            None => Err(DatabaseError::not_found(
                "WebhookEvent",
                format!("{}:{}", crm_system, external_event_id),
            )
            .into()),
        }
    }

    async fn get(
        &self,
        crm_system: CrmSystem,
        external_event_id: &str,
    ) -> Result<Option<IdempotencyRecord>, PortError> {
        let row = self.repository.find(crm_system, external_event_id).await?;
        Ok(row.map(|r| r.into_record()).transpose()?)
    }

    #[instrument(skip(self))]
    async fn purge_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, PortError> {
        let deleted = self.repository.delete_processed_before(cutoff).await?;
        info!(deleted, cutoff = %cutoff, "purged webhook idempotency records");
        Ok(deleted)
    }
}
