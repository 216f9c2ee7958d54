//! Property-Based Test Generators
//!
//! Proptest strategies for CRM tags, canonical entities and inbound webhooks.

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use core_kernel::{CrmSystem, EntityId, EntityType, TenantId};
use domain_mapping::{CanonicalEntity, Company, Contact};
use domain_sync::InboundWebhookEvent;

/// Any supported CRM
pub fn crm_system_strategy() -> impl Strategy<Value = CrmSystem> {
    prop_oneof![
        Just(CrmSystem::HubSpot),
        Just(CrmSystem::Salesforce),
        Just(CrmSystem::Pipedrive),
        Just(CrmSystem::SapB1),
    ]
}

/// CRMs with built-in default mappings
pub fn mapped_crm_strategy() -> impl Strategy<Value = CrmSystem> {
    prop_oneof![
        Just(CrmSystem::HubSpot),
        Just(CrmSystem::Salesforce),
        Just(CrmSystem::SapB1),
    ]
}

pub fn entity_type_strategy() -> impl Strategy<Value = EntityType> {
    prop_oneof![
        Just(EntityType::Company),
        Just(EntityType::Contact),
        Just(EntityType::Opportunity),
    ]
}

/// Printable, non-blank text
pub fn text_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9 .&-]{0,30}"
}

/// Webhook event ids as CRMs send them
pub fn event_id_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9]{4,12}-[0-9]{1,6}"
}

/// A company with a random subset of fields set
pub fn company_strategy(tenant_id: TenantId) -> impl Strategy<Value = Company> {
    (
        text_strategy(),
        proptest::option::of("[a-z]{3,10}\\.(io|com|de)"),
        proptest::option::of(1u64..100_000),
        proptest::option::of(text_strategy()),
    )
        .prop_map(move |(name, domain, employees, industry)| {
            let mut company = Company::new(tenant_id, EntityId::new());
            company.updated_at = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_else(Utc::now);
            company.name = Some(name);
            company.domain = domain;
            company.employees = employees;
            company.industry = industry;
            company
        })
}

/// A contact with at least a last name
pub fn contact_strategy(tenant_id: TenantId) -> impl Strategy<Value = Contact> {
    (
        proptest::option::of(text_strategy()),
        text_strategy(),
        proptest::option::of("[a-z]{2,8}@[a-z]{3,8}\\.io"),
    )
        .prop_map(move |(first_name, last_name, email)| {
            let mut contact = Contact::new(tenant_id, EntityId::new());
            contact.first_name = first_name;
            contact.last_name = Some(last_name);
            contact.email = email;
            contact
        })
}

/// A company or a contact
pub fn entity_strategy(tenant_id: TenantId) -> impl Strategy<Value = CanonicalEntity> {
    prop_oneof![
        company_strategy(tenant_id).prop_map(CanonicalEntity::Company),
        contact_strategy(tenant_id).prop_map(CanonicalEntity::Contact),
    ]
}

/// A HubSpot company webhook with a random name and age
pub fn hubspot_company_webhook_strategy(
    tenant_id: TenantId,
    external_object_id: String,
) -> impl Strategy<Value = InboundWebhookEvent> {
    (event_id_strategy(), text_strategy(), 0i64..240).prop_map(move |(event_id, name, minutes_ago)| {
        InboundWebhookEvent::new(tenant_id, CrmSystem::HubSpot, event_id, external_object_id.clone(), EntityType::Company)
            .with_field("name", name)
            .with_occurred_at(Utc::now() - Duration::minutes(minutes_ago))
    })
}
