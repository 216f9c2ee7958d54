//! Sync runtime wiring
//!
//! `SyncRuntime::build` is the one startup routine a host calls. It creates
//! the event bus and the orchestrator, which owns the mapping engine and the
//! idempotency guard, and subscribes the outbound handler. Nothing is
//! registered implicitly.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

use core_kernel::{HealthCheckable, RegistryHealthReport};
use domain_events::{EventBus, EventHandler, Subscription};
use domain_sync::{
    register_sync_handlers, CrmClientRegistry, SyncConfig, SyncOrchestrator, SyncPorts,
    WebhookIdempotencyGuard,
};

/// The wired sync components
pub struct SyncRuntime {
    bus: EventBus,
    orchestrator: Arc<SyncOrchestrator>,
    handler: Arc<dyn EventHandler>,
    ports: SyncPorts,
    extra_health_checks: Vec<Arc<dyn HealthCheckable>>,
}

impl SyncRuntime {
    /// Builds every component and registers the outbound handler
    pub fn build(config: SyncConfig, ports: SyncPorts, clients: CrmClientRegistry) -> Self {
        let bus = EventBus::new();
        let orchestrator = Arc::new(SyncOrchestrator::new(
            ports.clone(),
            Arc::new(clients),
            bus.clone(),
            config,
        ));
        let handler = register_sync_handlers(&bus, &orchestrator);

        info!(
            crm_clients = ?orchestrator.clients().systems(),
            subscriptions = bus.subscriptions().len(),
            "sync runtime started"
        );

        Self {
            bus,
            orchestrator,
            handler,
            ports,
            extra_health_checks: Vec::new(),
        }
    }

    /// Adds an adapter, such as the rule store, to the health report
    pub fn with_health_check(mut self, adapter: Arc<dyn HealthCheckable>) -> Self {
        self.extra_health_checks.push(adapter);
        self
    }

    /// Where the host publishes entity-updated events
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    pub fn guard(&self) -> &WebhookIdempotencyGuard {
        self.orchestrator.guard()
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.bus.subscriptions()
    }

    /// Checks every port adapter the runtime was built with
    pub async fn health(&self) -> RegistryHealthReport {
        let mut checks = vec![
            self.ports.entities.health_check(),
            self.ports.connections.health_check(),
            self.ports.links.health_check(),
            self.ports.ledger.health_check(),
        ];
        checks.extend(self.extra_health_checks.iter().map(|a| a.health_check()));

        let report = RegistryHealthReport::from_results(join_all(checks).await);
        if !report.is_fully_healthy() {
            warn!(
                status = ?report.overall_status,
                unhealthy = ?report.unhealthy_adapters(),
                "sync runtime is not fully healthy"
            );
        }
        report
    }

    /// Unsubscribes the outbound handler; already running syncs finish
    pub fn shutdown(&self) {
        let mut removed = 0;
        for subscription in self.bus.subscriptions() {
            if subscription.handler == self.handler.name()
                && self.bus.unsubscribe(&subscription.event_name, &self.handler)
            {
                removed += 1;
            }
        }
        info!(removed, "sync runtime stopped");
    }
}
