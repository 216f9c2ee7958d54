//! CRM Sync Domain
//!
//! This crate runs synchronization between canonical entities and the CRMs
//! a tenant has connected, in both directions.
//!
//! # Components
//!
//! - **CrmClient / CrmClientRegistry**: one capability trait for every CRM
//!   backend, looked up by `CrmSystem`
//! - **WebhookIdempotencyGuard**: atomic first-seen claim per webhook
//!   delivery, backed by an `IdempotencyLedger`
//! - **SyncOrchestrator**: the outbound fan-out and the inbound webhook path
//! - **OutboundSyncHandler**: bridges the event bus to the orchestrator
//!
//! # Startup
//!
//! ```rust,ignore
//! use domain_sync::{register_sync_handlers, SyncConfig, SyncOrchestrator};
//!
//! let bus = EventBus::new();
//! let orchestrator = Arc::new(SyncOrchestrator::new(ports, clients, bus.clone(), SyncConfig::default()));
//! register_sync_handlers(&bus, &orchestrator);
//! ```
//!
//! # Cycle breaking
//!
//! An inbound change is re-published with its source CRM as the event's
//! origin. The outbound path skips the origin, so the change reaches every
//! other connected CRM but never echoes back.

pub mod adapters;
pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod idempotency;
pub mod orchestrator;
pub mod ports;
pub mod registry;
pub mod webhook;

pub use adapters::{CircuitBreakingClient, CIRCUIT_OPEN};
pub use client::{ConnectionInfo, CrmClient, CrmSyncResult};
pub use config::SyncConfig;
pub use error::SyncError;
pub use handlers::{register_sync_handlers, OutboundSyncHandler, OUTBOUND_SYNC_HANDLER};
pub use idempotency::{
    Claim, IdempotencyLedger, IdempotencyOutcome, IdempotencyRecord, WebhookIdempotencyGuard,
};
pub use orchestrator::{
    InboundReport, InboundSkipReason, InboundState, OutboundReport, OutboundSkipReason,
    OutboundState, RejectReason, SyncOrchestrator, SyncPorts,
};
pub use ports::{ConnectionStore, EntityLink, EntityLinkStore, EntityRepository};
pub use registry::CrmClientRegistry;
pub use webhook::InboundWebhookEvent;

#[cfg(any(test, feature = "mock"))]
pub use client::mock::{MockBehavior, RecordedCall, ScriptedCrmClient};
#[cfg(any(test, feature = "mock"))]
pub use idempotency::mock::InMemoryIdempotencyLedger;
#[cfg(any(test, feature = "mock"))]
pub use ports::mock::{InMemoryConnectionStore, InMemoryEntityLinkStore, InMemoryEntityRepository};
