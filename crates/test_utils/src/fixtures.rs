//! Pre-built Test Fixtures
//!
//! Fixed, predictable values for tenants, timestamps, connections and raw
//! webhook fields.

use chrono::{DateTime, Duration, TimeZone, Utc};
use once_cell::sync::Lazy;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use core_kernel::{CrmSystem, EntityId, TenantId};
use domain_sync::ConnectionInfo;

static ACME_TENANT: Lazy<TenantId> = Lazy::new(|| {
    TenantId::from_uuid(Uuid::from_u128(0x0000_0001_0000_4000_8000_0000_0000_0001))
});

static GLOBEX_TENANT: Lazy<TenantId> = Lazy::new(|| {
    TenantId::from_uuid(Uuid::from_u128(0x0000_0002_0000_4000_8000_0000_0000_0002))
});

/// Fixture for identifiers
pub struct IdFixtures;

impl IdFixtures {
    /// The tenant most tests run as
    pub fn tenant_acme() -> TenantId {
        *ACME_TENANT
    }

    /// A second tenant, for isolation tests
    pub fn tenant_globex() -> TenantId {
        *GLOBEX_TENANT
    }

    /// A fresh entity id
    pub fn entity_id() -> EntityId {
        EntityId::new()
    }

    /// A unique webhook event id
    pub fn external_event_id() -> String {
        format!("evt-{}", Uuid::new_v4())
    }
}

/// Fixture for timestamps
pub struct TimeFixtures;

impl TimeFixtures {
    /// When fixture entities were last modified
    pub fn entity_updated_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    /// A webhook timestamp newer than `entity_updated_at`
    pub fn webhook_after_update() -> DateTime<Utc> {
        Self::entity_updated_at() + Duration::minutes(5)
    }

    /// A webhook timestamp older than `entity_updated_at`
    pub fn webhook_before_update() -> DateTime<Utc> {
        Self::entity_updated_at() - Duration::minutes(5)
    }
}

/// Fixture for CRM connections
pub struct ConnectionFixtures;

impl ConnectionFixtures {
    pub fn enabled(tenant_id: TenantId, crm_system: CrmSystem) -> ConnectionInfo {
        ConnectionInfo::new(tenant_id, crm_system, format!("{}-access-token", crm_system))
    }

    pub fn disabled(tenant_id: TenantId, crm_system: CrmSystem) -> ConnectionInfo {
        Self::enabled(tenant_id, crm_system).disabled()
    }

    /// A connection with a refresh token that expires in an hour
    pub fn with_refresh(tenant_id: TenantId, crm_system: CrmSystem) -> ConnectionInfo {
        Self::enabled(tenant_id, crm_system)
            .with_refresh_token(format!("{}-refresh-token", crm_system), Utc::now() + Duration::hours(1))
    }
}

/// Fixture for raw webhook field maps, keyed by CRM field names
pub struct WebhookFieldFixtures;

impl WebhookFieldFixtures {
    pub fn hubspot_company() -> Map<String, Value> {
        as_map(json!({
            "name": "Acme Corp",
            "domain": "acme.io",
            "numberofemployees": "250",
            "hs_lead_status": "OPEN"
        }))
    }

    pub fn salesforce_contact() -> Map<String, Value> {
        as_map(json!({
            "FirstName": "Ada",
            "LastName": "Lovelace",
            "Email": "ada@acme.io",
            "Title": "CTO"
        }))
    }

    /// Fields no default rule maps
    pub fn unmapped_only() -> Map<String, Value> {
        as_map(json!({
            "hs_object_source": "INTEGRATION",
            "hs_lastmodifieddate": "1709287200000"
        }))
    }
}

fn as_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
