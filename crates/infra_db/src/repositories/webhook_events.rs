//! Webhook event repository
//!
//! Rows of `crm_webhook_events`, one per `(crm_system, external_event_id)`.
//! The unique key is what makes a claim atomic: the insert either creates
//! the row or does nothing.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use core_kernel::CrmSystem;
use domain_sync::{IdempotencyOutcome, IdempotencyRecord};

use crate::error::DatabaseError;

const TABLE: &str = "crm_webhook_events";

/// Database row for a processed webhook
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WebhookEventRow {
    pub crm_system: String,
    pub external_event_id: String,
    pub processed_at: DateTime<Utc>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub outcome: Option<String>,
}

impl WebhookEventRow {
    /// Converts the row into the ledger record
    pub fn into_record(self) -> Result<IdempotencyRecord, DatabaseError> {
        let crm_system = self
            .crm_system
            .parse::<CrmSystem>()
            .map_err(|e| DatabaseError::corrupt_row(TABLE, e))?;
        let outcome = self
            .outcome
            .as_deref()
            .map(str::parse::<IdempotencyOutcome>)
            .transpose()
            .map_err(|e| DatabaseError::corrupt_row(TABLE, e))?;

        Ok(IdempotencyRecord {
            crm_system,
            external_event_id: self.external_event_id,
            processed_at: self.processed_at,
            occurred_at: self.occurred_at,
            outcome,
        })
    }
}

/// Repository for the webhook idempotency table
#[derive(Debug, Clone)]
pub struct WebhookEventRepository {
    pool: PgPool,
}

impl WebhookEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts the key unless it exists; true when this call inserted it
    pub async fn insert_if_absent(
        &self,
        crm_system: CrmSystem,
        external_event_id: &str,
        occurred_at: Option<DateTime<Utc>>,
    ) -> Result<bool, DatabaseError> {
        let inserted: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO crm_webhook_events (crm_system, external_event_id, occurred_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (crm_system, external_event_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(crm_system.as_str())
        .bind(external_event_id)
        .bind(occurred_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(inserted.is_some())
    }

    /// Sets the outcome on a row that has none yet
    ///
    /// Returns the number of rows changed: 0 when the row is missing or
    /// already has an outcome.
    pub async fn set_outcome_if_unset(
        &self,
        crm_system: CrmSystem,
        external_event_id: &str,
        outcome: IdempotencyOutcome,
    ) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE crm_webhook_events
            SET outcome = $3
            WHERE crm_system = $1 AND external_event_id = $2 AND outcome IS NULL
            "#,
        )
        .bind(crm_system.as_str())
        .bind(external_event_id)
        .bind(outcome.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn find(
        &self,
        crm_system: CrmSystem,
        external_event_id: &str,
    ) -> Result<Option<WebhookEventRow>, DatabaseError> {
        let row = sqlx::query_as::<_, WebhookEventRow>(
            r#"
            SELECT crm_system, external_event_id, processed_at, occurred_at, outcome
            FROM crm_webhook_events
            WHERE crm_system = $1 AND external_event_id = $2
            "#,
        )
        .bind(crm_system.as_str())
        .bind(external_event_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Deletes rows processed before the cutoff
    pub async fn delete_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM crm_webhook_events WHERE processed_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
