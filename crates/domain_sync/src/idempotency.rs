//! Webhook Idempotency Guard
//!
//! CRMs deliver webhooks at least once and sometimes in bursts of
//! duplicates. Before any inbound work runs, the guard claims the event's
//! `(crm_system, external_event_id)` key in the ledger. The ledger's insert
//! is atomic on that key, so across any number of concurrent deliveries
//! exactly one caller sees `claimed = true`.
//!
//! The row written by the claim is never re-inserted. Once processing ends,
//! its outcome is annotated once; later annotations are ignored.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, instrument};

use core_kernel::{CoreError, CrmSystem, DomainPort, HealthCheckable, PortError};

use crate::error::SyncError;

/// How processing of a claimed webhook ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyOutcome {
    Success,
    Failure,
    Skipped,
}

impl IdempotencyOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdempotencyOutcome::Success => "success",
            IdempotencyOutcome::Failure => "failure",
            IdempotencyOutcome::Skipped => "skipped",
        }
    }
}

impl fmt::Display for IdempotencyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdempotencyOutcome {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(IdempotencyOutcome::Success),
            "failure" => Ok(IdempotencyOutcome::Failure),
            "skipped" => Ok(IdempotencyOutcome::Skipped),
            other => Err(CoreError::unknown_tag("idempotency outcome", other)),
        }
    }
}

/// A ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub crm_system: CrmSystem,
    pub external_event_id: String,
    pub processed_at: DateTime<Utc>,
    /// When the CRM says the change happened, if the webhook told us
    pub occurred_at: Option<DateTime<Utc>>,
    /// Unset while processing is in flight
    pub outcome: Option<IdempotencyOutcome>,
}

/// Storage for processed webhook keys
#[async_trait]
pub trait IdempotencyLedger: DomainPort + HealthCheckable {
    /// Inserts the key if it is new; true when this call inserted it
    ///
    /// Must be atomic with respect to concurrent calls for the same key.
    async fn insert_if_absent(
        &self,
        crm_system: CrmSystem,
        external_event_id: &str,
        occurred_at: Option<DateTime<Utc>>,
    ) -> Result<bool, PortError>;

    /// Sets the outcome if none is set yet
    ///
    /// Returns `PortError::NotFound` if the key was never inserted.
    async fn record_outcome(
        &self,
        crm_system: CrmSystem,
        external_event_id: &str,
        outcome: IdempotencyOutcome,
    ) -> Result<(), PortError>;

    async fn get(
        &self,
        crm_system: CrmSystem,
        external_event_id: &str,
    ) -> Result<Option<IdempotencyRecord>, PortError>;

    /// Deletes records processed before `cutoff`, returning how many went
    async fn purge_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, PortError>;
}

/// Result of a claim attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub crm_system: CrmSystem,
    pub external_event_id: String,
    /// True for exactly one caller per key
    pub claimed: bool,
}

/// First-seen gate in front of inbound webhook processing
#[derive(Clone)]
pub struct WebhookIdempotencyGuard {
    ledger: Arc<dyn IdempotencyLedger>,
}

impl WebhookIdempotencyGuard {
    pub fn new(ledger: Arc<dyn IdempotencyLedger>) -> Self {
        Self { ledger }
    }

    /// Claims a webhook key
    pub async fn try_claim(
        &self,
        crm_system: CrmSystem,
        external_event_id: &str,
    ) -> Result<Claim, SyncError> {
        self.try_claim_observed(crm_system, external_event_id, None)
            .await
    }

    /// Claims a webhook key, storing the CRM's own timestamp with it
    #[instrument(skip(self))]
    pub async fn try_claim_observed(
        &self,
        crm_system: CrmSystem,
        external_event_id: &str,
        occurred_at: Option<DateTime<Utc>>,
    ) -> Result<Claim, SyncError> {
        let external_event_id = normalize_event_id(external_event_id)?;
        let claimed = self
            .ledger
            .insert_if_absent(crm_system, external_event_id, occurred_at)
            .await?;

        if !claimed {
            debug!("webhook already claimed");
        }

        Ok(Claim {
            crm_system,
            external_event_id: external_event_id.to_string(),
            claimed,
        })
    }

    /// Annotates a claimed key with its processing outcome
    pub async fn complete(
        &self,
        crm_system: CrmSystem,
        external_event_id: &str,
        outcome: IdempotencyOutcome,
    ) -> Result<(), SyncError> {
        let external_event_id = normalize_event_id(external_event_id)?;
        self.ledger
            .record_outcome(crm_system, external_event_id, outcome)
            .await?;
        Ok(())
    }

    pub async fn record(
        &self,
        crm_system: CrmSystem,
        external_event_id: &str,
    ) -> Result<Option<IdempotencyRecord>, SyncError> {
        let external_event_id = normalize_event_id(external_event_id)?;
        Ok(self.ledger.get(crm_system, external_event_id).await?)
    }

    /// Drops records older than `retention`, measured from `now`
    pub async fn purge_older_than(
        &self,
        retention: Duration,
        now: DateTime<Utc>,
    ) -> Result<u64, SyncError> {
        Ok(self.ledger.purge_processed_before(now - retention).await?)
    }
}

impl fmt::Debug for WebhookIdempotencyGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookIdempotencyGuard").finish_non_exhaustive()
    }
}

fn normalize_event_id(external_event_id: &str) -> Result<&str, SyncError> {
    let trimmed = external_event_id.trim();
    if trimmed.is_empty() {
        return Err(SyncError::invalid_webhook("external event id is blank"));
    }
    Ok(trimmed)
}

/// In-memory ledger for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use core_kernel::HealthCheckResult;
    use std::collections::hash_map::Entry;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Mutex, PoisonError};

    type Key = (CrmSystem, String);

    /// Ledger backed by one mutex-guarded map
    ///
    /// The lock is only taken inside synchronous sections, never across an
    /// `.await`.
    #[derive(Debug, Default)]
    pub struct InMemoryIdempotencyLedger {
        records: Mutex<HashMap<Key, IdempotencyRecord>>,
        unavailable: AtomicBool,
    }

    impl InMemoryIdempotencyLedger {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn len(&self) -> usize {
            self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        /// Makes every call fail with a connection error
        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }

        /// Backdates a record, for retention tests
        pub fn set_processed_at(
            &self,
            crm_system: CrmSystem,
            external_event_id: &str,
            processed_at: DateTime<Utc>,
        ) {
            let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(record) = records.get_mut(&(crm_system, external_event_id.to_string())) {
                record.processed_at = processed_at;
            }
        }

        fn check_available(&self) -> Result<(), PortError> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(PortError::connection("idempotency ledger unavailable"));
            }
            Ok(())
        }
    }

    impl DomainPort for InMemoryIdempotencyLedger {}

    #[async_trait]
    impl HealthCheckable for InMemoryIdempotencyLedger {
        async fn health_check(&self) -> HealthCheckResult {
            HealthCheckResult::healthy("mock-idempotency-ledger", 0)
        }
    }

    #[async_trait]
    impl IdempotencyLedger for InMemoryIdempotencyLedger {
        async fn insert_if_absent(
            &self,
            crm_system: CrmSystem,
            external_event_id: &str,
            occurred_at: Option<DateTime<Utc>>,
        ) -> Result<bool, PortError> {
            self.check_available()?;
            let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
            match records.entry((crm_system, external_event_id.to_string())) {
                Entry::Occupied(_) => Ok(false),
                Entry::Vacant(slot) => {
                    slot.insert(IdempotencyRecord {
                        crm_system,
                        external_event_id: external_event_id.to_string(),
                        processed_at: Utc::now(),
                        occurred_at,
                        outcome: None,
                    });
                    Ok(true)
                }
            }
        }

        async fn record_outcome(
            &self,
            crm_system: CrmSystem,
            external_event_id: &str,
            outcome: IdempotencyOutcome,
        ) -> Result<(), PortError> {
            self.check_available()?;
            let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
            let record = records
                .get_mut(&(crm_system, external_event_id.to_string()))
                .ok_or_else(|| {
                    PortError::not_found("WebhookEvent", format!("{}:{}", crm_system, external_event_id))
                })?;
            if record.outcome.is_none() {
                record.outcome = Some(outcome);
            }
            Ok(())
        }

        async fn get(
            &self,
            crm_system: CrmSystem,
            external_event_id: &str,
        ) -> Result<Option<IdempotencyRecord>, PortError> {
            self.check_available()?;
            let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
            Ok(records
                .get(&(crm_system, external_event_id.to_string()))
                .cloned())
        }

        async fn purge_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64, PortError> {
            self.check_available()?;
            let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
            let before = records.len();
            records.retain(|_, record| record.processed_at >= cutoff);
            Ok((before - records.len()) as u64)
        }
    }
}
