//! Sync error types

use thiserror::Error;

use core_kernel::PortError;
use domain_mapping::MappingError;

/// Errors surfaced by the orchestrator and the idempotency guard
///
/// Remote CRM failures are not errors here; they are folded into
/// `CrmSyncResult` values. An `Err` means the pipeline itself could not run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A collaborator returned data that breaks its contract
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    /// A port (storage, link table, ledger) failed
    #[error("Port error: {0}")]
    Port(#[from] PortError),

    /// Rule loading or translation failed
    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// The webhook envelope is unusable
    #[error("Invalid webhook: {0}")]
    InvalidWebhook(String),
}

impl SyncError {
    pub fn contract_violation(message: impl Into<String>) -> Self {
        SyncError::ContractViolation(message.into())
    }

    pub fn invalid_webhook(message: impl Into<String>) -> Self {
        SyncError::InvalidWebhook(message.into())
    }

    /// True when a collaborator broke its contract, as opposed to an outage
    pub fn is_contract_violation(&self) -> bool {
        match self {
            SyncError::ContractViolation(_) => true,
            SyncError::Mapping(e) => e.is_contract_violation(),
            _ => false,
        }
    }

    /// Value for the `kind` field in error logs
    pub fn kind(&self) -> &'static str {
        if self.is_contract_violation() {
            return "contract_violation";
        }
        match self {
            SyncError::Port(_) => "port",
            SyncError::Mapping(_) => "mapping",
            SyncError::InvalidWebhook(_) => "invalid_webhook",
            SyncError::ContractViolation(_) => "contract_violation",
        }
    }
}
