//! Sync Orchestrator
//!
//! Decides which CRM operations to run for a change and runs them.
//!
//! # Outbound
//!
//! ```text
//! DomainEvent ─► load entity ─► connected CRMs (minus origin)
//!                                   │
//!                    ┌──────────────┼──────────────┐
//!                    ▼              ▼              ▼
//!              map + upsert   map + upsert   map + upsert    (concurrent)
//!                    └──────────────┼──────────────┘
//!                                   ▼
//!                         OutboundReport (one result per CRM)
//! ```
//!
//! # Inbound
//!
//! ```text
//! InboundWebhookEvent ─► claim ─► resolve link ─► load entity
//!     ─► parse_inbound ─► apply_partial_update ─► republish (origin = CRM)
//! ```
//!
//! Re-published events carry the source CRM as `origin`, and the outbound
//! path never sends a change back to its origin.

mod inbound;
mod outbound;
pub mod report;

use std::fmt;
use std::sync::Arc;

use domain_events::EventBus;
use domain_mapping::{MappingEngine, MappingRuleStore};

use crate::config::SyncConfig;
use crate::idempotency::{IdempotencyLedger, WebhookIdempotencyGuard};
use crate::ports::{ConnectionStore, EntityLinkStore, EntityRepository};
use crate::registry::CrmClientRegistry;

pub use outbound::{CLIENT_FAULT, CLIENT_NOT_REGISTERED, LINK_LOOKUP_FAILED, MAPPING_FAILED, TIMEOUT};
pub use report::{
    InboundReport, InboundSkipReason, InboundState, OutboundReport, OutboundSkipReason,
    OutboundState, RejectReason,
};

/// Every port the orchestrator needs, bundled for construction
#[derive(Clone)]
pub struct SyncPorts {
    pub entities: Arc<dyn EntityRepository>,
    pub connections: Arc<dyn ConnectionStore>,
    pub links: Arc<dyn EntityLinkStore>,
    pub ledger: Arc<dyn IdempotencyLedger>,
    pub rules: Arc<dyn MappingRuleStore>,
}

impl fmt::Debug for SyncPorts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncPorts").finish_non_exhaustive()
    }
}

/// Outbound fan-out and inbound webhook processing
pub struct SyncOrchestrator {
    entities: Arc<dyn EntityRepository>,
    connections: Arc<dyn ConnectionStore>,
    links: Arc<dyn EntityLinkStore>,
    clients: Arc<CrmClientRegistry>,
    mapping: MappingEngine,
    guard: WebhookIdempotencyGuard,
    bus: EventBus,
    config: SyncConfig,
}

impl SyncOrchestrator {
    /// Creates an orchestrator
    ///
    /// `bus` is where inbound changes are re-published; pass the same bus the
    /// outbound handler is subscribed on.
    pub fn new(
        ports: SyncPorts,
        clients: Arc<CrmClientRegistry>,
        bus: EventBus,
        config: SyncConfig,
    ) -> Self {
        Self {
            entities: ports.entities,
            connections: ports.connections,
            links: ports.links,
            clients,
            mapping: MappingEngine::new(ports.rules),
            guard: WebhookIdempotencyGuard::new(ports.ledger),
            bus,
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn guard(&self) -> &WebhookIdempotencyGuard {
        &self.guard
    }

    pub fn mapping(&self) -> &MappingEngine {
        &self.mapping
    }

    pub fn clients(&self) -> &CrmClientRegistry {
        &self.clients
    }
}

impl fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("clients", &self.clients)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
