//! Integration tests for domain_sync
//!
//! Runs the orchestrator against the in-memory ports and scripted CRM
//! clients.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use core_kernel::{
    CrmSystem, DomainPort, EntityId, EntityType, HealthCheckResult, HealthCheckable, PortError,
    TenantId,
};
use domain_events::{DomainEvent, EventBus};
use domain_mapping::{CanonicalEntity, Company, InMemoryRuleStore, MappingRule, PartialUpdate};
use domain_sync::{
    register_sync_handlers, ConnectionInfo, CrmClientRegistry, EntityLink, EntityLinkStore,
    EntityRepository, IdempotencyLedger, IdempotencyOutcome, InMemoryConnectionStore,
    InMemoryEntityLinkStore, InMemoryEntityRepository, InMemoryIdempotencyLedger, InboundReport,
    InboundSkipReason, InboundState, InboundWebhookEvent, MockBehavior, OutboundSkipReason,
    OutboundState, RejectReason, ScriptedCrmClient, SyncConfig, SyncError, SyncOrchestrator,
    SyncPorts, WebhookIdempotencyGuard, OUTBOUND_SYNC_HANDLER,
};

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    tenant: TenantId,
    bus: EventBus,
    entities: Arc<InMemoryEntityRepository>,
    connections: Arc<InMemoryConnectionStore>,
    links: Arc<InMemoryEntityLinkStore>,
    ledger: Arc<InMemoryIdempotencyLedger>,
    rules: Arc<InMemoryRuleStore>,
    hubspot: Arc<ScriptedCrmClient>,
    salesforce: Arc<ScriptedCrmClient>,
    orchestrator: Arc<SyncOrchestrator>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    fn with_config(config: SyncConfig) -> Self {
        Self::build(config, Arc::new(InMemoryEntityRepository::new()), |registry| registry)
    }

    fn build(
        config: SyncConfig,
        entities: Arc<InMemoryEntityRepository>,
        extra_clients: impl FnOnce(CrmClientRegistry) -> CrmClientRegistry,
    ) -> Self {
        let bus = EventBus::new();
        let connections = Arc::new(InMemoryConnectionStore::new());
        let links = Arc::new(InMemoryEntityLinkStore::new());
        let ledger = Arc::new(InMemoryIdempotencyLedger::new());
        let rules = Arc::new(InMemoryRuleStore::new());
        let hubspot = Arc::new(ScriptedCrmClient::new(CrmSystem::HubSpot));
        let salesforce = Arc::new(ScriptedCrmClient::new(CrmSystem::Salesforce));

        let registry = extra_clients(
            CrmClientRegistry::new()
                .with_client(hubspot.clone())
                .with_client(salesforce.clone()),
        );

        let ports = SyncPorts {
            entities: entities.clone(),
            connections: connections.clone(),
            links: links.clone(),
            ledger: ledger.clone(),
            rules: rules.clone(),
        };
        let orchestrator = Arc::new(SyncOrchestrator::new(ports, Arc::new(registry), bus.clone(), config));
        register_sync_handlers(&bus, &orchestrator);

        Self {
            tenant: TenantId::new(),
            bus,
            entities,
            connections,
            links,
            ledger,
            rules,
            hubspot,
            salesforce,
            orchestrator,
        }
    }

    async fn connect(&self, crm_system: CrmSystem) {
        self.connections
            .add(ConnectionInfo::new(self.tenant, crm_system, format!("{}-token", crm_system)))
            .await;
    }

    /// Stores a company last modified an hour ago
    async fn add_company(&self, name: &str, domain: Option<&str>) -> EntityId {
        let mut company = Company::new(self.tenant, EntityId::new());
        company.name = Some(name.to_string());
        company.domain = domain.map(str::to_string);
        company.updated_at = Utc::now() - Duration::hours(1);
        let id = company.id;
        self.entities.insert(CanonicalEntity::Company(company)).await;
        id
    }

    async fn link(&self, crm_system: CrmSystem, entity_id: EntityId, external_id: &str) {
        self.links
            .upsert_link(EntityLink::new(
                self.tenant,
                crm_system,
                EntityType::Company,
                entity_id,
                external_id,
            ))
            .await
            .unwrap();
    }

    fn company_event(&self, entity_id: EntityId) -> DomainEvent {
        DomainEvent::company_updated(self.tenant, entity_id)
    }
}

fn hubspot_webhook(tenant: TenantId, event_id: &str, object_id: &str) -> InboundWebhookEvent {
    InboundWebhookEvent::new(tenant, CrmSystem::HubSpot, event_id, object_id, EntityType::Company)
        .with_field("name", "Acme Corp")
        .with_occurred_at(Utc::now())
}

async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    condition()
}

// ============================================================================
// Outbound Tests
// ============================================================================

mod outbound_tests {
    use super::*;

    #[tokio::test]
    async fn test_hubspot_company_payload_omits_absent_fields() {
        let h = Harness::new();
        h.connect(CrmSystem::HubSpot).await;
        let id = h.add_company("Acme", Some("acme.io")).await;

        let report = h.orchestrator.sync_outbound(&h.company_event(id)).await.unwrap();

        assert_eq!(report.state, OutboundState::Completed);
        assert_eq!(report.results.len(), 1);
        let result = report.result_for(CrmSystem::HubSpot).unwrap();
        assert!(result.is_success());
        assert_eq!(result.status_code(), Some(201));

        let call = h.hubspot.last_call().unwrap();
        assert_eq!(
            call.payload.properties(),
            json!({"name": "Acme", "domain": "acme.io"}).as_object().unwrap()
        );
        assert!(call.payload.crm_id().is_none());
        assert_eq!(call.correlation_id, Some(report.event_id.to_string()));
    }

    #[tokio::test]
    async fn test_new_crm_id_is_linked() {
        let h = Harness::new();
        h.connect(CrmSystem::HubSpot).await;
        let id = h.add_company("Acme", None).await;

        h.orchestrator.sync_outbound(&h.company_event(id)).await.unwrap();

        let linked = h
            .links
            .find_external_id(h.tenant, CrmSystem::HubSpot, EntityType::Company, id)
            .await
            .unwrap();
        assert_eq!(linked.as_deref(), Some("hubspot-1"));
    }

    #[tokio::test]
    async fn test_existing_link_is_sent_as_crm_id() {
        let h = Harness::new();
        h.connect(CrmSystem::HubSpot).await;
        let id = h.add_company("Acme", None).await;
        h.link(CrmSystem::HubSpot, id, "512").await;

        let report = h.orchestrator.sync_outbound(&h.company_event(id)).await.unwrap();

        assert_eq!(h.hubspot.last_call().unwrap().payload.crm_id(), Some("512"));
        assert_eq!(report.result_for(CrmSystem::HubSpot).unwrap().status_code(), Some(200));
        assert_eq!(h.links.all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_one_crm_failing_does_not_affect_another() {
        let h = Harness::new();
        h.connect(CrmSystem::HubSpot).await;
        h.connect(CrmSystem::Salesforce).await;
        h.hubspot.set_behavior(MockBehavior::Reject {
            status_code: 503,
            error_code: "http_503".to_string(),
            message: "maintenance".to_string(),
        });
        let id = h.add_company("Acme", None).await;

        let report = h.orchestrator.sync_outbound(&h.company_event(id)).await.unwrap();

        assert_eq!(report.state, OutboundState::PartiallyFailed);
        assert_eq!(report.failed_crms(), vec![CrmSystem::HubSpot]);
        assert_eq!(report.succeeded_crms(), vec![CrmSystem::Salesforce]);
        let failed = report.result_for(CrmSystem::HubSpot).unwrap();
        assert_eq!(failed.error_code(), Some("http_503"));
        assert_eq!(failed.error_message(), Some("maintenance"));
    }

    #[tokio::test]
    async fn test_client_fault_becomes_failed_result() {
        let h = Harness::new();
        h.connect(CrmSystem::HubSpot).await;
        h.connect(CrmSystem::Salesforce).await;
        h.hubspot.set_behavior(MockBehavior::Fault("token refresh failed".to_string()));
        let id = h.add_company("Acme", None).await;

        let report = h.orchestrator.sync_outbound(&h.company_event(id)).await.unwrap();

        let failed = report.result_for(CrmSystem::HubSpot).unwrap();
        assert_eq!(failed.error_code(), Some(domain_sync::orchestrator::CLIENT_FAULT));
        assert!(failed.error_message().unwrap().contains("token refresh failed"));
        assert!(report.result_for(CrmSystem::Salesforce).unwrap().is_success());
    }

    #[tokio::test]
    async fn test_client_panic_is_contained() {
        let h = Harness::new();
        h.connect(CrmSystem::HubSpot).await;
        h.connect(CrmSystem::Salesforce).await;
        h.salesforce.set_behavior(MockBehavior::Panic);
        let id = h.add_company("Acme", None).await;

        let report = h.orchestrator.sync_outbound(&h.company_event(id)).await.unwrap();

        assert_eq!(report.state, OutboundState::PartiallyFailed);
        assert_eq!(
            report.result_for(CrmSystem::Salesforce).unwrap().error_code(),
            Some(domain_sync::orchestrator::CLIENT_FAULT)
        );
        assert!(report.result_for(CrmSystem::HubSpot).unwrap().is_success());
    }

    #[tokio::test]
    async fn test_slow_crm_times_out_alone() {
        let h = Harness::with_config(
            SyncConfig::default().with_crm_call_timeout(StdDuration::from_millis(20)),
        );
        h.connect(CrmSystem::HubSpot).await;
        h.connect(CrmSystem::Salesforce).await;
        h.hubspot.set_behavior(MockBehavior::Delay(StdDuration::from_secs(5)));
        let id = h.add_company("Acme", None).await;

        let report = h.orchestrator.sync_outbound(&h.company_event(id)).await.unwrap();

        let timed_out = report.result_for(CrmSystem::HubSpot).unwrap();
        assert_eq!(timed_out.error_code(), Some(domain_sync::orchestrator::TIMEOUT));
        assert!(timed_out.duration_ms() >= 20);
        assert!(report.result_for(CrmSystem::Salesforce).unwrap().is_success());
        assert!(h
            .links
            .find_external_id(h.tenant, CrmSystem::HubSpot, EntityType::Company, id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_connected_crm_without_client() {
        let h = Harness::new();
        h.connect(CrmSystem::SapB1).await;
        let id = h.add_company("Acme", None).await;

        let report = h.orchestrator.sync_outbound(&h.company_event(id)).await.unwrap();

        assert_eq!(report.state, OutboundState::PartiallyFailed);
        assert_eq!(
            report.result_for(CrmSystem::SapB1).unwrap().error_code(),
            Some(domain_sync::orchestrator::CLIENT_NOT_REGISTERED)
        );
    }

    #[tokio::test]
    async fn test_missing_entity_is_skipped() {
        let h = Harness::new();
        h.connect(CrmSystem::HubSpot).await;

        let report = h
            .orchestrator
            .sync_outbound(&h.company_event(EntityId::new()))
            .await
            .unwrap();

        assert_eq!(report.state, OutboundState::Skipped(OutboundSkipReason::EntityNotFound));
        assert_eq!(h.hubspot.call_count(), 0);
    }

    #[tokio::test]
    async fn test_disabled_connections_are_ignored() {
        let h = Harness::new();
        h.connections
            .add(ConnectionInfo::new(h.tenant, CrmSystem::HubSpot, "t").disabled())
            .await;
        let id = h.add_company("Acme", None).await;

        let report = h.orchestrator.sync_outbound(&h.company_event(id)).await.unwrap();

        assert_eq!(report.state, OutboundState::Skipped(OutboundSkipReason::NoConnectedCrm));
        assert_eq!(h.hubspot.call_count(), 0);
    }

    #[tokio::test]
    async fn test_origin_crm_is_not_called() {
        let h = Harness::new();
        h.connect(CrmSystem::HubSpot).await;
        h.connect(CrmSystem::Salesforce).await;
        let id = h.add_company("Acme", None).await;

        let event = h.company_event(id).with_origin(CrmSystem::HubSpot);
        let report = h.orchestrator.sync_outbound(&event).await.unwrap();

        assert_eq!(report.state, OutboundState::Completed);
        assert_eq!(h.hubspot.call_count(), 0);
        assert_eq!(h.salesforce.call_count(), 1);
    }

    #[tokio::test]
    async fn test_only_origin_connected_is_skipped() {
        let h = Harness::new();
        h.connect(CrmSystem::HubSpot).await;
        let id = h.add_company("Acme", None).await;

        let event = h.company_event(id).with_origin(CrmSystem::HubSpot);
        let report = h.orchestrator.sync_outbound(&event).await.unwrap();

        assert_eq!(report.state, OutboundState::Skipped(OutboundSkipReason::NoConnectedCrm));
    }

    #[tokio::test]
    async fn test_empty_payload_skipped_when_configured() {
        let pipedrive = Arc::new(ScriptedCrmClient::new(CrmSystem::Pipedrive));
        let h = Harness::build(
            SyncConfig::default().with_skip_empty_payloads(true),
            Arc::new(InMemoryEntityRepository::new()),
            |registry| registry.with_client(pipedrive.clone()),
        );
        h.connect(CrmSystem::Pipedrive).await;
        h.connect(CrmSystem::HubSpot).await;
        let id = h.add_company("Acme", None).await;

        let report = h.orchestrator.sync_outbound(&h.company_event(id)).await.unwrap();

        assert_eq!(report.state, OutboundState::Completed);
        assert_eq!(report.skipped_crms, vec![CrmSystem::Pipedrive]);
        assert_eq!(pipedrive.call_count(), 0);
        assert_eq!(h.hubspot.call_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_payload_sent_by_default() {
        let pipedrive = Arc::new(ScriptedCrmClient::new(CrmSystem::Pipedrive));
        let h = Harness::build(
            SyncConfig::default(),
            Arc::new(InMemoryEntityRepository::new()),
            |registry| registry.with_client(pipedrive.clone()),
        );
        h.connect(CrmSystem::Pipedrive).await;
        let id = h.add_company("Acme", None).await;

        let report = h.orchestrator.sync_outbound(&h.company_event(id)).await.unwrap();

        assert_eq!(report.state, OutboundState::Completed);
        assert!(pipedrive.last_call().unwrap().payload.is_empty());
    }

    #[tokio::test]
    async fn test_rule_store_outage_fails_each_crm() {
        let h = Harness::new();
        h.connect(CrmSystem::HubSpot).await;
        h.connect(CrmSystem::Salesforce).await;
        h.rules.set_unavailable(true);
        let id = h.add_company("Acme", None).await;

        let report = h.orchestrator.sync_outbound(&h.company_event(id)).await.unwrap();

        assert_eq!(report.state, OutboundState::PartiallyFailed);
        assert!(report
            .results
            .iter()
            .all(|r| r.error_code() == Some(domain_sync::orchestrator::MAPPING_FAILED)));
        assert_eq!(h.hubspot.call_count(), 0);
    }

    #[tokio::test]
    async fn test_tenant_override_renames_crm_field() {
        let h = Harness::new();
        h.connect(CrmSystem::HubSpot).await;
        h.rules
            .add_override(
                h.tenant,
                MappingRule::tenant_rule(h.tenant, CrmSystem::HubSpot, EntityType::Company, "name", "legal_name"),
            )
            .await;
        let id = h.add_company("Acme", None).await;

        h.orchestrator.sync_outbound(&h.company_event(id)).await.unwrap();

        let properties = h.hubspot.last_call().unwrap().payload.properties().clone();
        assert_eq!(properties.get("legal_name"), Some(&json!("Acme")));
        assert!(!properties.contains_key("name"));
    }

    #[tokio::test]
    async fn test_repository_outage_is_an_error() {
        let h = Harness::new();
        h.connect(CrmSystem::HubSpot).await;
        let id = h.add_company("Acme", None).await;
        h.entities.set_unavailable(true);

        let err = h.orchestrator.sync_outbound(&h.company_event(id)).await.unwrap_err();

        assert!(matches!(err, SyncError::Port(ref e) if e.is_transient()));
        assert!(!err.is_contract_violation());
    }

    /// Answers every lookup with an entity from some other tenant
    struct ForeignEntityRepository;

    impl DomainPort for ForeignEntityRepository {}

    #[async_trait]
    impl HealthCheckable for ForeignEntityRepository {
        async fn health_check(&self) -> HealthCheckResult {
            HealthCheckResult::healthy("foreign", 0)
        }
    }

    #[async_trait]
    impl EntityRepository for ForeignEntityRepository {
        async fn get(
            &self,
            _tenant_id: TenantId,
            _entity_type: EntityType,
            entity_id: EntityId,
        ) -> Result<Option<CanonicalEntity>, PortError> {
            Ok(Some(CanonicalEntity::Company(Company::new(TenantId::new(), entity_id))))
        }

        async fn apply_partial_update(
            &self,
            _tenant_id: TenantId,
            _entity_type: EntityType,
            entity_id: EntityId,
            _update: &PartialUpdate,
        ) -> Result<CanonicalEntity, PortError> {
            Err(PortError::not_found("company", entity_id))
        }
    }

    #[tokio::test]
    async fn test_entity_from_wrong_tenant_is_contract_violation() {
        let h = Harness::new();
        let ports = SyncPorts {
            entities: Arc::new(ForeignEntityRepository),
            connections: h.connections.clone(),
            links: h.links.clone(),
            ledger: h.ledger.clone(),
            rules: h.rules.clone(),
        };
        let orchestrator = SyncOrchestrator::new(
            ports,
            Arc::new(CrmClientRegistry::new().with_client(h.hubspot.clone())),
            EventBus::new(),
            SyncConfig::default(),
        );
        h.connect(CrmSystem::HubSpot).await;

        let err = orchestrator
            .sync_outbound(&h.company_event(EntityId::new()))
            .await
            .unwrap_err();

        assert!(err.is_contract_violation());
        assert_eq!(h.hubspot.call_count(), 0);
    }
}

// ============================================================================
// Inbound Tests
// ============================================================================

mod inbound_tests {
    use super::*;

    async fn linked_company(h: &Harness, external_id: &str) -> EntityId {
        let id = h.add_company("Acme", Some("acme.io")).await;
        h.link(CrmSystem::HubSpot, id, external_id).await;
        id
    }

    #[tokio::test]
    async fn test_webhook_updates_linked_entity() {
        let h = Harness::with_config(SyncConfig::default().with_republish_inbound_updates(false));
        let id = linked_company(&h, "512").await;

        let report = h
            .orchestrator
            .process_inbound(&hubspot_webhook(h.tenant, "evt-1", "512"))
            .await
            .unwrap();

        assert_eq!(report.state, InboundState::Applied);
        assert_eq!(report.entity_id, Some(id));
        assert_eq!(report.tenant_id, Some(h.tenant));
        assert_eq!(report.applied_fields, vec!["name".to_string()]);
        assert!(report.republished_event.is_none());

        let stored = h.entities.stored(h.tenant, EntityType::Company, id).await.unwrap();
        assert_eq!(stored.field("name").unwrap(), Some(json!("Acme Corp")));
        assert_eq!(stored.field("domain").unwrap(), Some(json!("acme.io")));
    }

    #[tokio::test]
    async fn test_same_webhook_twice_applies_once() {
        let h = Harness::new();
        linked_company(&h, "512").await;
        let webhook = hubspot_webhook(h.tenant, "evt-1", "512");

        let first = h.orchestrator.process_inbound(&webhook).await.unwrap();
        let second = h.orchestrator.process_inbound(&webhook).await.unwrap();

        assert_eq!(first.state, InboundState::Applied);
        assert_eq!(second.state, InboundState::Duplicate);
        assert!(second.is_applied());
        assert_eq!(h.entities.updates_applied(), 1);
        assert_eq!(h.ledger.len(), 1);

        let record = h.ledger.get(CrmSystem::HubSpot, "evt-1").await.unwrap().unwrap();
        assert_eq!(record.outcome, Some(IdempotencyOutcome::Success));
        assert_eq!(record.occurred_at, webhook.occurred_at);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_deliveries_apply_once() {
        let h = Harness::new();
        linked_company(&h, "512").await;
        let webhook = hubspot_webhook(h.tenant, "evt-burst", "512");

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let orchestrator = h.orchestrator.clone();
                let webhook = webhook.clone();
                tokio::spawn(async move { orchestrator.process_inbound(&webhook).await })
            })
            .collect();

        let mut reports: Vec<InboundReport> = Vec::new();
        for task in tasks {
            reports.push(task.await.unwrap().unwrap());
        }

        let applied = reports.iter().filter(|r| r.state == InboundState::Applied).count();
        let duplicates = reports.iter().filter(|r| r.state == InboundState::Duplicate).count();
        assert_eq!(applied, 1);
        assert_eq!(duplicates, 15);
        assert_eq!(h.entities.updates_applied(), 1);
    }

    #[tokio::test]
    async fn test_same_crm_object_id_in_two_tenants_stays_apart() {
        let h = Harness::with_config(SyncConfig::default().with_republish_inbound_updates(false));
        let own = linked_company(&h, "512").await;

        let other_tenant = TenantId::new();
        let mut other = Company::new(other_tenant, EntityId::new());
        other.name = Some("Globex".to_string());
        other.updated_at = Utc::now() - Duration::hours(1);
        let other_id = other.id;
        h.entities.insert(CanonicalEntity::Company(other)).await;
        h.links
            .upsert_link(EntityLink::new(other_tenant, CrmSystem::HubSpot, EntityType::Company, other_id, "512"))
            .await
            .unwrap();

        let webhook = InboundWebhookEvent::new(other_tenant, CrmSystem::HubSpot, "evt-other", "512", EntityType::Company)
            .with_field("name", "Globex Holdings")
            .with_occurred_at(Utc::now());
        let report = h.orchestrator.process_inbound(&webhook).await.unwrap();

        assert_eq!(report.state, InboundState::Applied);
        assert_eq!(report.tenant_id, Some(other_tenant));
        assert_eq!(report.entity_id, Some(other_id));
        let updated = h.entities.stored(other_tenant, EntityType::Company, other_id).await.unwrap();
        assert_eq!(updated.field("name").unwrap(), Some(json!("Globex Holdings")));
        let untouched = h.entities.stored(h.tenant, EntityType::Company, own).await.unwrap();
        assert_eq!(untouched.field("name").unwrap(), Some(json!("Acme")));
    }

    #[tokio::test]
    async fn test_object_linked_only_in_another_tenant_is_rejected() {
        let h = Harness::new();
        linked_company(&h, "512").await;

        let report = h
            .orchestrator
            .process_inbound(&hubspot_webhook(TenantId::new(), "evt-stranger", "512"))
            .await
            .unwrap();

        assert_eq!(report.state, InboundState::Rejected(RejectReason::NoLink));
        assert_eq!(h.entities.updates_applied(), 0);
    }

    #[tokio::test]
    async fn test_unlinked_object_is_rejected() {
        let h = Harness::new();

        let report = h
            .orchestrator
            .process_inbound(&hubspot_webhook(h.tenant, "evt-2", "999"))
            .await
            .unwrap();

        assert_eq!(report.state, InboundState::Rejected(RejectReason::NoLink));
        let record = h.ledger.get(CrmSystem::HubSpot, "evt-2").await.unwrap().unwrap();
        assert_eq!(record.outcome, Some(IdempotencyOutcome::Skipped));
    }

    #[tokio::test]
    async fn test_link_to_deleted_entity_is_rejected() {
        let h = Harness::new();
        h.link(CrmSystem::HubSpot, EntityId::new(), "512").await;

        let report = h
            .orchestrator
            .process_inbound(&hubspot_webhook(h.tenant, "evt-3", "512"))
            .await
            .unwrap();

        assert_eq!(report.state, InboundState::Rejected(RejectReason::EntityNotFound));
        assert_eq!(h.entities.updates_applied(), 0);
    }

    #[tokio::test]
    async fn test_stale_webhook_is_skipped() {
        let h = Harness::new();
        linked_company(&h, "512").await;
        let webhook = InboundWebhookEvent::new(h.tenant, CrmSystem::HubSpot, "evt-4", "512", EntityType::Company)
            .with_field("name", "Old Name")
            .with_occurred_at(Utc::now() - Duration::days(1));

        let report = h.orchestrator.process_inbound(&webhook).await.unwrap();

        assert_eq!(report.state, InboundState::Skipped(InboundSkipReason::OutOfOrder));
        assert_eq!(h.entities.updates_applied(), 0);
    }

    #[tokio::test]
    async fn test_webhook_without_timestamp_is_applied() {
        let h = Harness::new();
        linked_company(&h, "512").await;
        let webhook = InboundWebhookEvent::new(h.tenant, CrmSystem::HubSpot, "evt-5", "512", EntityType::Company)
            .with_field("domain", "acme.com");

        let report = h.orchestrator.process_inbound(&webhook).await.unwrap();

        assert_eq!(report.state, InboundState::Applied);
    }

    #[tokio::test]
    async fn test_unmapped_fields_only_is_skipped() {
        let h = Harness::new();
        linked_company(&h, "512").await;
        let webhook = InboundWebhookEvent::new(h.tenant, CrmSystem::HubSpot, "evt-6", "512", EntityType::Company)
            .with_field("hs_lead_status", "NEW")
            .with_occurred_at(Utc::now());

        let report = h.orchestrator.process_inbound(&webhook).await.unwrap();

        assert_eq!(report.state, InboundState::Skipped(InboundSkipReason::NoMappedFields));
        assert_eq!(h.entities.updates_applied(), 0);
    }

    #[tokio::test]
    async fn test_repository_failure_records_failure_and_keeps_claim() {
        let h = Harness::new();
        linked_company(&h, "512").await;
        h.entities.set_unavailable(true);
        let webhook = hubspot_webhook(h.tenant, "evt-7", "512");

        let err = h.orchestrator.process_inbound(&webhook).await.unwrap_err();
        assert!(matches!(err, SyncError::Port(_)));

        let record = h.ledger.get(CrmSystem::HubSpot, "evt-7").await.unwrap().unwrap();
        assert_eq!(record.outcome, Some(IdempotencyOutcome::Failure));

        h.entities.set_unavailable(false);
        let redelivered = h.orchestrator.process_inbound(&webhook).await.unwrap();
        assert_eq!(redelivered.state, InboundState::Duplicate);
    }

    #[tokio::test]
    async fn test_ledger_outage_is_an_error() {
        let h = Harness::new();
        linked_company(&h, "512").await;
        h.ledger.set_unavailable(true);

        let err = h
            .orchestrator
            .process_inbound(&hubspot_webhook(h.tenant, "evt-8", "512"))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Port(_)));
        assert_eq!(h.entities.updates_applied(), 0);
    }

    #[tokio::test]
    async fn test_blank_event_id_is_invalid() {
        let h = Harness::new();
        let err = h
            .orchestrator
            .process_inbound(&hubspot_webhook(h.tenant, " ", "512"))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::InvalidWebhook(_)));
        assert!(h.ledger.is_empty());
    }

    #[tokio::test]
    async fn test_batch_continues_past_failures() {
        let h = Harness::with_config(SyncConfig::default().with_republish_inbound_updates(false));
        linked_company(&h, "512").await;
        let batch = vec![
            hubspot_webhook(h.tenant, "evt-a", ""),
            hubspot_webhook(h.tenant, "evt-b", "512"),
            hubspot_webhook(h.tenant, "evt-b", "512"),
        ];

        let results = h.orchestrator.process_inbound_batch(&batch).await;

        assert_eq!(results.len(), 3);
        assert!(matches!(results[0], Err(SyncError::InvalidWebhook(_))));
        assert_eq!(results[1].as_ref().unwrap().state, InboundState::Applied);
        assert_eq!(results[2].as_ref().unwrap().state, InboundState::Duplicate);
    }
}

// ============================================================================
// Cycle Tests
// ============================================================================

mod cycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_inbound_change_fans_out_but_not_back_to_origin() {
        let h = Harness::new();
        h.connect(CrmSystem::HubSpot).await;
        h.connect(CrmSystem::Salesforce).await;
        let id = h.add_company("Acme", None).await;
        h.link(CrmSystem::HubSpot, id, "512").await;

        let report = h
            .orchestrator
            .process_inbound(&hubspot_webhook(h.tenant, "evt-1", "512"))
            .await
            .unwrap();
        assert!(report.republished_event.is_some());

        let salesforce = h.salesforce.clone();
        assert!(eventually(move || salesforce.call_count() == 1).await);

        let call = h.salesforce.last_call().unwrap();
        assert_eq!(call.payload.properties().get("Name"), Some(&json!("Acme Corp")));
        assert_eq!(call.correlation_id, report.republished_event.map(|e| e.to_string()));
        assert_eq!(h.hubspot.call_count(), 0);
    }

    #[tokio::test]
    async fn test_republish_disabled_sends_nothing() {
        let h = Harness::with_config(SyncConfig::default().with_republish_inbound_updates(false));
        h.connect(CrmSystem::Salesforce).await;
        let id = h.add_company("Acme", None).await;
        h.link(CrmSystem::HubSpot, id, "512").await;

        h.orchestrator
            .process_inbound(&hubspot_webhook(h.tenant, "evt-1", "512"))
            .await
            .unwrap();
        tokio::time::sleep(StdDuration::from_millis(50)).await;

        assert_eq!(h.salesforce.call_count(), 0);
    }
}

// ============================================================================
// Handler Tests
// ============================================================================

mod handler_tests {
    use super::*;

    #[test]
    fn test_registration_covers_every_entity_event() {
        let h = Harness::new();
        let subscriptions = h.bus.subscriptions();

        assert_eq!(subscriptions.len(), DomainEvent::ALL_NAMES.len());
        for name in DomainEvent::ALL_NAMES {
            assert!(subscriptions
                .iter()
                .any(|s| s.event_name == name && s.handler == OUTBOUND_SYNC_HANDLER));
        }
    }

    #[tokio::test]
    async fn test_publish_drives_outbound_sync() {
        let h = Harness::new();
        h.connect(CrmSystem::HubSpot).await;
        let id = h.add_company("Acme", None).await;

        let report = h.bus.publish(&h.company_event(id)).await;

        assert!(report.is_clean());
        assert_eq!(report.handled, 1);
        assert_eq!(h.hubspot.call_count(), 1);
    }

    #[tokio::test]
    async fn test_sync_error_surfaces_as_handler_failure() {
        let h = Harness::new();
        h.connect(CrmSystem::HubSpot).await;
        let id = h.add_company("Acme", None).await;
        h.entities.set_unavailable(true);

        let report = h.bus.publish(&h.company_event(id)).await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].handler, OUTBOUND_SYNC_HANDLER);
    }

    #[tokio::test]
    async fn test_remote_failures_do_not_fail_the_handler() {
        let h = Harness::new();
        h.connect(CrmSystem::HubSpot).await;
        h.hubspot.set_behavior(MockBehavior::Fault("boom".to_string()));
        let id = h.add_company("Acme", None).await;

        let report = h.bus.publish(&h.company_event(id)).await;

        assert!(report.is_clean());
    }
}

// ============================================================================
// Idempotency Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_one_claim_per_distinct_key(ids in prop::collection::vec("[a-c]{1,2}", 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let guard = WebhookIdempotencyGuard::new(Arc::new(InMemoryIdempotencyLedger::new()));

        let claimed = runtime.block_on(async {
            let mut claimed = 0;
            for id in &ids {
                if guard.try_claim(CrmSystem::Pipedrive, id).await.unwrap().claimed {
                    claimed += 1;
                }
            }
            claimed
        });

        let distinct: std::collections::HashSet<_> = ids.iter().collect();
        prop_assert_eq!(claimed, distinct.len());
    }
}
