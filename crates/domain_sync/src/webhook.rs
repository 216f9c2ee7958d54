//! Normalized inbound webhook
//!
//! Each CRM's webhook format is parsed and its signature checked before it
//! reaches the engine. What arrives here is one change to one CRM object in
//! one tenant's CRM account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use core_kernel::{CrmSystem, EntityType, TenantId};

use crate::error::SyncError;

/// One CRM-side change, as delivered by a webhook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundWebhookEvent {
    /// Tenant whose CRM account sent the webhook; CRM object ids are only
    /// unique within it
    pub tenant_id: TenantId,
    pub crm_system: CrmSystem,
    /// The CRM's id for this delivery; the idempotency key
    pub external_event_id: String,
    /// The CRM's id for the changed object
    pub external_object_id: String,
    /// Which kind of object changed, used to look up the link
    pub entity_type_hint: EntityType,
    /// Changed properties in the CRM's field names
    #[serde(default)]
    pub raw_fields: Map<String, Value>,
    /// When the CRM says the change happened
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

impl InboundWebhookEvent {
    pub fn new(
        tenant_id: TenantId,
        crm_system: CrmSystem,
        external_event_id: impl Into<String>,
        external_object_id: impl Into<String>,
        entity_type_hint: EntityType,
    ) -> Self {
        Self {
            tenant_id,
            crm_system,
            external_event_id: external_event_id.into(),
            external_object_id: external_object_id.into(),
            entity_type_hint,
            raw_fields: Map::new(),
            occurred_at: None,
        }
    }

    pub fn with_field(mut self, crm_field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.raw_fields.insert(crm_field.into(), value.into());
        self
    }

    pub fn with_raw_fields(mut self, raw_fields: Map<String, Value>) -> Self {
        self.raw_fields = raw_fields;
        self
    }

    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    /// Rejects envelopes without the ids processing depends on
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.external_event_id.trim().is_empty() {
            return Err(SyncError::invalid_webhook("external event id is blank"));
        }
        if self.external_object_id.trim().is_empty() {
            return Err(SyncError::invalid_webhook(format!(
                "event {} has a blank object id",
                self.external_event_id
            )));
        }
        Ok(())
    }
}
