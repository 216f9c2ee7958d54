//! Event handlers and their registration
//!
//! Nothing subscribes itself. The host calls `register_sync_handlers` once
//! at startup, and `EventBus::subscriptions` shows what was registered.

use async_trait::async_trait;
use std::sync::{Arc, Weak};
use tracing::debug;

use domain_events::{DomainEvent, EventBus, EventHandler, HandlerError};

use crate::orchestrator::{OutboundState, SyncOrchestrator};

/// Handler name as it appears in subscriptions and logs
pub const OUTBOUND_SYNC_HANDLER: &str = "outbound_crm_sync";

/// Runs the outbound path for every entity-updated event
///
/// Holds the orchestrator weakly: the orchestrator owns the bus that owns
/// this handler.
#[derive(Debug)]
pub struct OutboundSyncHandler {
    orchestrator: Weak<SyncOrchestrator>,
}

impl OutboundSyncHandler {
    pub fn new(orchestrator: &Arc<SyncOrchestrator>) -> Self {
        Self {
            orchestrator: Arc::downgrade(orchestrator),
        }
    }
}

#[async_trait]
impl EventHandler for OutboundSyncHandler {
    fn name(&self) -> &str {
        OUTBOUND_SYNC_HANDLER
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        let Some(orchestrator) = self.orchestrator.upgrade() else {
            return Err(HandlerError::failed("sync orchestrator has been shut down"));
        };

        let report = orchestrator
            .sync_outbound(event)
            .await
            .map_err(|e| HandlerError::from_source("outbound sync failed", e))?;

        // Per-CRM failures are part of the report and already logged
        if report.state == OutboundState::PartiallyFailed {
            debug!(
                event_id = %event.event_id(),
                failed = ?report.failed_crms(),
                "outbound sync partially failed"
            );
        }
        Ok(())
    }
}

/// Subscribes the outbound handler to every entity-updated event
///
/// Returns the handler so the host can unsubscribe it again.
pub fn register_sync_handlers(
    bus: &EventBus,
    orchestrator: &Arc<SyncOrchestrator>,
) -> Arc<dyn EventHandler> {
    let handler: Arc<dyn EventHandler> = Arc::new(OutboundSyncHandler::new(orchestrator));
    for event_name in DomainEvent::ALL_NAMES {
        bus.subscribe(event_name, handler.clone());
    }
    handler
}
