//! Pipeline states and per-run reports

use serde::Serialize;
use std::fmt;

use core_kernel::{CrmSystem, EntityId, EntityType, EventId, TenantId};

use crate::client::CrmSyncResult;
use crate::idempotency::IdempotencyOutcome;

/// Why an outbound run did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundSkipReason {
    EntityNotFound,
    NoConnectedCrm,
}

/// Outbound pipeline state
///
/// `Triggered → Loaded → Mapped → Dispatched → Completed | PartiallyFailed`,
/// or `Skipped` when there is nothing to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum OutboundState {
    Triggered,
    Loaded,
    Mapped,
    Dispatched,
    Completed,
    PartiallyFailed,
    Skipped(OutboundSkipReason),
}

impl OutboundState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OutboundState::Completed | OutboundState::PartiallyFailed | OutboundState::Skipped(_)
        )
    }
}

impl fmt::Display for OutboundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutboundState::Triggered => f.write_str("triggered"),
            OutboundState::Loaded => f.write_str("loaded"),
            OutboundState::Mapped => f.write_str("mapped"),
            OutboundState::Dispatched => f.write_str("dispatched"),
            OutboundState::Completed => f.write_str("completed"),
            OutboundState::PartiallyFailed => f.write_str("partially_failed"),
            OutboundState::Skipped(reason) => write!(f, "skipped({:?})", reason),
        }
    }
}

/// Result of syncing one domain event out to the tenant's CRMs
#[derive(Debug, Clone, Serialize)]
pub struct OutboundReport {
    pub event_id: EventId,
    pub tenant_id: TenantId,
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub state: OutboundState,
    /// One result per CRM that was called, in connection order
    pub results: Vec<CrmSyncResult>,
    /// CRMs left out because their payload was empty
    pub skipped_crms: Vec<CrmSystem>,
}

impl OutboundReport {
    pub(crate) fn triggered(
        event_id: EventId,
        tenant_id: TenantId,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> Self {
        Self {
            event_id,
            tenant_id,
            entity_type,
            entity_id,
            state: OutboundState::Triggered,
            results: Vec::new(),
            skipped_crms: Vec::new(),
        }
    }

    pub fn result_for(&self, crm_system: CrmSystem) -> Option<&CrmSyncResult> {
        self.results.iter().find(|r| r.crm_system() == crm_system)
    }

    pub fn succeeded_crms(&self) -> Vec<CrmSystem> {
        self.results
            .iter()
            .filter(|r| r.is_success())
            .map(CrmSyncResult::crm_system)
            .collect()
    }

    pub fn failed_crms(&self) -> Vec<CrmSystem> {
        self.results
            .iter()
            .filter(|r| !r.is_success())
            .map(CrmSyncResult::crm_system)
            .collect()
    }
}

/// Why an inbound webhook was not applied because its target is unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The CRM object is not linked to any internal entity
    NoLink,
    /// The link points at an entity that no longer exists
    EntityNotFound,
}

/// Why an inbound webhook was deliberately not applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InboundSkipReason {
    /// The entity changed after the CRM-side change
    OutOfOrder,
    /// None of the webhook's fields are mapped
    NoMappedFields,
}

/// Inbound pipeline state
///
/// `Received → Claimed → Resolved → Applied | Rejected`, with `Duplicate`
/// for already-claimed deliveries and `Skipped` for stale or empty changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum InboundState {
    Received,
    Claimed,
    Resolved,
    Applied,
    Rejected(RejectReason),
    Duplicate,
    Skipped(InboundSkipReason),
}

impl InboundState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InboundState::Applied
                | InboundState::Rejected(_)
                | InboundState::Duplicate
                | InboundState::Skipped(_)
        )
    }

    /// What to record on the ledger for this terminal state
    ///
    /// `None` for duplicates, which own no ledger row, and for non-terminal
    /// states.
    pub fn ledger_outcome(&self) -> Option<IdempotencyOutcome> {
        match self {
            InboundState::Applied => Some(IdempotencyOutcome::Success),
            InboundState::Rejected(_) | InboundState::Skipped(_) => Some(IdempotencyOutcome::Skipped),
            _ => None,
        }
    }
}

impl fmt::Display for InboundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InboundState::Received => f.write_str("received"),
            InboundState::Claimed => f.write_str("claimed"),
            InboundState::Resolved => f.write_str("resolved"),
            InboundState::Applied => f.write_str("applied"),
            InboundState::Rejected(reason) => write!(f, "rejected({:?})", reason),
            InboundState::Duplicate => f.write_str("duplicate"),
            InboundState::Skipped(reason) => write!(f, "skipped({:?})", reason),
        }
    }
}

/// Result of processing one inbound webhook
#[derive(Debug, Clone, Serialize)]
pub struct InboundReport {
    pub crm_system: CrmSystem,
    pub external_event_id: String,
    pub state: InboundState,
    /// Set once the external object was resolved to an internal entity
    pub tenant_id: Option<TenantId>,
    pub entity_id: Option<EntityId>,
    /// Canonical fields written by this webhook
    pub applied_fields: Vec<String>,
    /// Id of the updated event published after applying
    pub republished_event: Option<EventId>,
}

impl InboundReport {
    pub(crate) fn received(crm_system: CrmSystem, external_event_id: &str) -> Self {
        Self {
            crm_system,
            external_event_id: external_event_id.to_string(),
            state: InboundState::Received,
            tenant_id: None,
            entity_id: None,
            applied_fields: Vec::new(),
            republished_event: None,
        }
    }

    /// Duplicates count as handled
    pub fn is_applied(&self) -> bool {
        matches!(self.state, InboundState::Applied | InboundState::Duplicate)
    }
}
