//! In-memory sync environment
//!
//! Wires a `SyncOrchestrator` to the in-memory ports, a scripted client per
//! CRM and a live event bus with the outbound handler subscribed.

use std::collections::BTreeMap;
use std::sync::Arc;

use core_kernel::{CrmSystem, TenantId};
use domain_events::{EventBus, EventHandler};
use domain_mapping::{CanonicalEntity, InMemoryRuleStore};
use domain_sync::{
    register_sync_handlers, CrmClientRegistry, EntityLink, EntityLinkStore,
    InMemoryConnectionStore, InMemoryEntityLinkStore, InMemoryEntityRepository,
    InMemoryIdempotencyLedger, ScriptedCrmClient, SyncConfig, SyncOrchestrator, SyncPorts,
};

use crate::fixtures::{ConnectionFixtures, IdFixtures};

/// A fully wired sync engine over in-memory ports
pub struct SyncTestEnv {
    pub tenant_id: TenantId,
    pub bus: EventBus,
    pub entities: Arc<InMemoryEntityRepository>,
    pub connections: Arc<InMemoryConnectionStore>,
    pub links: Arc<InMemoryEntityLinkStore>,
    pub ledger: Arc<InMemoryIdempotencyLedger>,
    pub rules: Arc<InMemoryRuleStore>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub handler: Arc<dyn EventHandler>,
    clients: BTreeMap<CrmSystem, Arc<ScriptedCrmClient>>,
}

impl SyncTestEnv {
    /// Scripted clients for every CRM, default config, nothing connected
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    pub fn with_config(config: SyncConfig) -> Self {
        let clients: BTreeMap<CrmSystem, Arc<ScriptedCrmClient>> = CrmSystem::ALL
            .into_iter()
            .map(|system| (system, Arc::new(ScriptedCrmClient::new(system))))
            .collect();
        let registry = clients
            .values()
            .fold(CrmClientRegistry::new(), |registry, client| registry.with_client(client.clone()));

        let entities = Arc::new(InMemoryEntityRepository::new());
        let connections = Arc::new(InMemoryConnectionStore::new());
        let links = Arc::new(InMemoryEntityLinkStore::new());
        let ledger = Arc::new(InMemoryIdempotencyLedger::new());
        let rules = Arc::new(InMemoryRuleStore::new());

        let ports = SyncPorts {
            entities: entities.clone(),
            connections: connections.clone(),
            links: links.clone(),
            ledger: ledger.clone(),
            rules: rules.clone(),
        };
        let bus = EventBus::new();
        let orchestrator = Arc::new(SyncOrchestrator::new(ports, Arc::new(registry), bus.clone(), config));
        let handler = register_sync_handlers(&bus, &orchestrator);

        Self {
            tenant_id: IdFixtures::tenant_acme(),
            bus,
            entities,
            connections,
            links,
            ledger,
            rules,
            orchestrator,
            handler,
            clients,
        }
    }

    /// The scripted client for `crm_system`
    pub fn client(&self, crm_system: CrmSystem) -> Arc<ScriptedCrmClient> {
        match self.clients.get(&crm_system) {
            Some(client) => client.clone(),
            None => unreachable!("every CRM system gets a scripted client"),
        }
    }

    /// Total calls across all scripted clients
    pub fn total_calls(&self) -> usize {
        self.clients.values().map(|c| c.call_count()).sum()
    }

    /// Connects the default tenant to each listed CRM
    pub async fn connect(&self, systems: &[CrmSystem]) {
        for system in systems {
            self.connections
                .add(ConnectionFixtures::enabled(self.tenant_id, *system))
                .await;
        }
    }

    pub async fn store(&self, entity: CanonicalEntity) {
        self.entities.insert(entity).await;
    }

    /// Links an entity to a CRM object
    pub async fn link(&self, entity: &CanonicalEntity, crm_system: CrmSystem, external_id: &str) {
        let link = EntityLink::new(
            entity.tenant_id(),
            crm_system,
            entity.entity_type(),
            entity.id(),
            external_id,
        );
        if let Err(e) = self.links.upsert_link(link).await {
            panic!("in-memory link upsert failed: {}", e);
        }
    }

    /// Reads the stored copy of an entity back
    pub async fn stored(&self, entity: &CanonicalEntity) -> Option<CanonicalEntity> {
        self.entities
            .stored(entity.tenant_id(), entity.entity_type(), entity.id())
            .await
    }
}

impl Default for SyncTestEnv {
    fn default() -> Self {
        Self::new()
    }
}
