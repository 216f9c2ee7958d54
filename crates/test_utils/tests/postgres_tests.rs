//! PostgreSQL adapter tests
//!
//! Each test starts its own Postgres container, so they are ignored by
//! default. Run with
//! `cargo test -p test_utils --test postgres_tests -- --ignored`.

use chrono::{Duration, Utc};
use futures::future::join_all;
use std::sync::Arc;

use core_kernel::{AdapterHealth, CrmSystem, EntityId, EntityType, HealthCheckable, PortError, TenantId};
use domain_mapping::{MappingEngine, MappingRule};
use domain_sync::{
    ConnectionStore, EntityLink, EntityLinkStore, IdempotencyLedger, IdempotencyOutcome,
    WebhookIdempotencyGuard,
};
use infra_db::verify_schema;
use test_utils::{db_test, ConnectionFixtures, IdFixtures};

// ============================================================================
// Idempotency Ledger
// ============================================================================

db_test!(test_concurrent_claims_have_one_winner, |db| {
    let guard = WebhookIdempotencyGuard::new(db.ledger());
    let event_id = IdFixtures::external_event_id();

    let claims = join_all((0..16).map(|_| {
        let guard = guard.clone();
        let event_id = event_id.clone();
        tokio::spawn(async move { guard.try_claim(CrmSystem::HubSpot, &event_id).await })
    }))
    .await;

    let winners = claims
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .filter(|claim| claim.claimed)
        .count();
    assert_eq!(winners, 1);
});

db_test!(test_same_event_id_in_two_crms_are_distinct, |db| {
    let ledger = db.ledger();
    let event_id = IdFixtures::external_event_id();

    assert!(ledger.insert_if_absent(CrmSystem::HubSpot, &event_id, None).await.unwrap());
    assert!(ledger.insert_if_absent(CrmSystem::Salesforce, &event_id, None).await.unwrap());
});

db_test!(test_outcome_is_set_once, |db| {
    let ledger = db.ledger();
    let event_id = IdFixtures::external_event_id();
    let occurred_at = Utc::now() - Duration::minutes(3);

    ledger
        .insert_if_absent(CrmSystem::SapB1, &event_id, Some(occurred_at))
        .await
        .unwrap();
    ledger
        .record_outcome(CrmSystem::SapB1, &event_id, IdempotencyOutcome::Success)
        .await
        .unwrap();
    ledger
        .record_outcome(CrmSystem::SapB1, &event_id, IdempotencyOutcome::Failure)
        .await
        .unwrap();

    let record = ledger.get(CrmSystem::SapB1, &event_id).await.unwrap().unwrap();
    assert_eq!(record.outcome, Some(IdempotencyOutcome::Success));
    assert!(record.occurred_at.is_some());
});

db_test!(test_outcome_for_unknown_key_is_not_found, |db| {

    let result = db
        .ledger()
        .record_outcome(CrmSystem::HubSpot, "never-claimed", IdempotencyOutcome::Skipped)
        .await;

    assert!(matches!(result, Err(PortError::NotFound { .. })));
});

db_test!(test_purge_removes_only_old_records, |db| {
    let ledger = db.ledger();
    ledger.insert_if_absent(CrmSystem::HubSpot, "old", None).await.unwrap();
    sqlx::query("UPDATE crm_webhook_events SET processed_at = now() - interval '40 days' WHERE external_event_id = 'old'")
        .execute(db.pool())
        .await
        .unwrap();
    ledger.insert_if_absent(CrmSystem::HubSpot, "recent", None).await.unwrap();

    let deleted = WebhookIdempotencyGuard::new(ledger.clone())
        .purge_older_than(Duration::days(30), Utc::now())
        .await
        .unwrap();

    assert_eq!(deleted, 1);
    assert!(ledger.get(CrmSystem::HubSpot, "old").await.unwrap().is_none());
    assert!(ledger.get(CrmSystem::HubSpot, "recent").await.unwrap().is_some());
});

// ============================================================================
// Mapping Rules
// ============================================================================

db_test!(test_stored_rules_layer_over_builtin_defaults, |db| {
    let store = db.rule_store();
    let tenant = TenantId::new();
    store
        .repository()
        .insert(
            &MappingRule::default_rule(CrmSystem::Salesforce, EntityType::Opportunity, "pipeline", "Pipeline__c"),
            0,
        )
        .await
        .unwrap();
    store
        .repository()
        .insert(
            &MappingRule::tenant_rule(tenant, CrmSystem::Salesforce, EntityType::Opportunity, "stage", "Stage__c"),
            0,
        )
        .await
        .unwrap();

    let resolved = MappingEngine::new(store.clone())
        .resolve(tenant, CrmSystem::Salesforce, EntityType::Opportunity)
        .await
        .unwrap();
    let other = MappingEngine::new(store)
        .resolve(TenantId::new(), CrmSystem::Salesforce, EntityType::Opportunity)
        .await
        .unwrap();

    assert_eq!(resolved.get("name").unwrap().crm_field, "Name");
    assert_eq!(resolved.get("pipeline").unwrap().crm_field, "Pipeline__c");
    assert_eq!(resolved.get("stage").unwrap().crm_field, "Stage__c");
    assert_eq!(other.get("stage").unwrap().crm_field, "StageName");
});

// ============================================================================
// Entity Links
// ============================================================================

db_test!(test_link_upsert_resolve_and_repoint, |db| {
    let links = db.link_store();
    let tenant = TenantId::new();
    let entity = EntityId::new();
    let first_id = format!("hs-{}", entity);
    let second_id = format!("hs-moved-{}", entity);

    links
        .upsert_link(EntityLink::new(tenant, CrmSystem::HubSpot, EntityType::Contact, entity, &first_id))
        .await
        .unwrap();
    let resolved = links
        .resolve_external_id(tenant, CrmSystem::HubSpot, EntityType::Contact, &first_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolved.entity_id, entity);
    assert_eq!(resolved.tenant_id, tenant);

    links
        .upsert_link(EntityLink::new(tenant, CrmSystem::HubSpot, EntityType::Contact, entity, &second_id))
        .await
        .unwrap();

    assert_eq!(
        links
            .find_external_id(tenant, CrmSystem::HubSpot, EntityType::Contact, entity)
            .await
            .unwrap(),
        Some(second_id)
    );
    assert!(links
        .resolve_external_id(tenant, CrmSystem::HubSpot, EntityType::Contact, &first_id)
        .await
        .unwrap()
        .is_none());
    assert!(links
        .resolve_external_id(tenant, CrmSystem::HubSpot, EntityType::Company, &first_id)
        .await
        .unwrap()
        .is_none());
});

db_test!(test_object_linked_twice_is_a_conflict, |db| {
    let links = db.link_store();
    let tenant = TenantId::new();
    let external_id = format!("sf-{}", EntityId::new());

    links
        .upsert_link(EntityLink::new(tenant, CrmSystem::Salesforce, EntityType::Company, EntityId::new(), &external_id))
        .await
        .unwrap();
    let result = links
        .upsert_link(EntityLink::new(tenant, CrmSystem::Salesforce, EntityType::Company, EntityId::new(), &external_id))
        .await;

    assert!(matches!(result, Err(PortError::Conflict { .. })));
});

db_test!(test_tenants_link_the_same_external_id_independently, |db| {
    let links = db.link_store();
    let (acme, globex) = (TenantId::new(), TenantId::new());
    let (acme_entity, globex_entity) = (EntityId::new(), EntityId::new());

    links
        .upsert_link(EntityLink::new(acme, CrmSystem::HubSpot, EntityType::Company, acme_entity, "512"))
        .await
        .unwrap();
    links
        .upsert_link(EntityLink::new(globex, CrmSystem::HubSpot, EntityType::Company, globex_entity, "512"))
        .await
        .unwrap();

    for (tenant, entity) in [(acme, acme_entity), (globex, globex_entity)] {
        let link = links
            .resolve_external_id(tenant, CrmSystem::HubSpot, EntityType::Company, "512")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(link.tenant_id, tenant);
        assert_eq!(link.entity_id, entity);
    }
    assert!(links
        .resolve_external_id(TenantId::new(), CrmSystem::HubSpot, EntityType::Company, "512")
        .await
        .unwrap()
        .is_none());
});

// ============================================================================
// Connections
// ============================================================================

db_test!(test_connections_round_trip_per_tenant, |db| {
    let store = db.connection_store();
    let tenant = TenantId::new();

    store
        .repository()
        .upsert(&ConnectionFixtures::with_refresh(tenant, CrmSystem::HubSpot))
        .await
        .unwrap();
    store
        .repository()
        .upsert(&ConnectionFixtures::disabled(tenant, CrmSystem::Salesforce))
        .await
        .unwrap();
    store
        .repository()
        .upsert(&ConnectionFixtures::enabled(TenantId::new(), CrmSystem::HubSpot))
        .await
        .unwrap();

    let mut connections = store.list_connected(tenant).await.unwrap();
    connections.sort_by_key(|c| c.crm_system);

    assert_eq!(connections.len(), 2);
    assert!(connections.iter().all(|c| c.tenant_id == tenant));
    assert_eq!(connections[0].crm_system, CrmSystem::HubSpot);
    assert_eq!(connections[0].refresh_token.as_deref(), Some("hubspot-refresh-token"));
    assert!(connections[0].enabled);
    assert!(!connections[1].enabled);
});

// ============================================================================
// Schema and Health
// ============================================================================

db_test!(test_schema_and_adapters_are_healthy, |db| {

    verify_schema(db.pool()).await.unwrap();

    let adapters: Vec<Arc<dyn HealthCheckable>> = vec![
        db.ledger(),
        db.rule_store(),
        db.link_store(),
        db.connection_store(),
    ];
    for adapter in adapters {
        let result = adapter.health_check().await;
        assert_eq!(result.status, AdapterHealth::Healthy, "{:?}", result);
    }
});

db_test!(test_clear_data_empties_tables, |db| {
    db.ledger()
        .insert_if_absent(CrmSystem::Pipedrive, "evt-1", None)
        .await
        .unwrap();

    db.clear_data().await.unwrap();

    let count: i64 = sqlx::query_scalar("SELECT count(*) FROM crm_webhook_events")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(count, 0);
});
