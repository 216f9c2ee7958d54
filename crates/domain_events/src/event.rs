//! Domain events for canonical entity changes
//!
//! Domain events represent significant occurrences on the canonical business
//! model. They are used for:
//! - Driving outbound synchronization to connected CRMs
//! - Closing the loop after an inbound webhook updated an entity
//!
//! An event is a value object. Its identity and timestamp are fixed when it is
//! created and there are no setters; `with_metadata` and `with_origin` consume
//! the event while it is still being built.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use core_kernel::{CrmSystem, EntityId, EntityType, EventId, TenantId};

/// Entity-specific part of a domain event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_name")]
pub enum EventPayload {
    /// A company record changed
    #[serde(rename = "CompanyUpdatedEvent")]
    CompanyUpdated { entity_id: EntityId },

    /// A contact record changed
    #[serde(rename = "ContactUpdatedEvent")]
    ContactUpdated { entity_id: EntityId },

    /// An opportunity (deal) record changed
    #[serde(rename = "OpportunityUpdatedEvent")]
    OpportunityUpdated { entity_id: EntityId },
}

impl EventPayload {
    /// Builds the "updated" payload for an entity of the given type
    pub fn updated(entity_type: EntityType, entity_id: EntityId) -> Self {
        match entity_type {
            EntityType::Company => EventPayload::CompanyUpdated { entity_id },
            EntityType::Contact => EventPayload::ContactUpdated { entity_id },
            EntityType::Opportunity => EventPayload::OpportunityUpdated { entity_id },
        }
    }

    /// Returns the discriminator string handlers subscribe to
    pub fn event_name(&self) -> &'static str {
        match self {
            EventPayload::CompanyUpdated { .. } => DomainEvent::COMPANY_UPDATED,
            EventPayload::ContactUpdated { .. } => DomainEvent::CONTACT_UPDATED,
            EventPayload::OpportunityUpdated { .. } => DomainEvent::OPPORTUNITY_UPDATED,
        }
    }

    pub fn entity_id(&self) -> EntityId {
        match self {
            EventPayload::CompanyUpdated { entity_id }
            | EventPayload::ContactUpdated { entity_id }
            | EventPayload::OpportunityUpdated { entity_id } => *entity_id,
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            EventPayload::CompanyUpdated { .. } => EntityType::Company,
            EventPayload::ContactUpdated { .. } => EntityType::Contact,
            EventPayload::OpportunityUpdated { .. } => EntityType::Opportunity,
        }
    }
}

/// An immutable record of a change to a tenant-scoped entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    event_id: EventId,
    occurred_at: DateTime<Utc>,
    tenant_id: TenantId,
    #[serde(flatten)]
    payload: EventPayload,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    origin: Option<CrmSystem>,
}

impl DomainEvent {
    pub const COMPANY_UPDATED: &'static str = "CompanyUpdatedEvent";
    pub const CONTACT_UPDATED: &'static str = "ContactUpdatedEvent";
    pub const OPPORTUNITY_UPDATED: &'static str = "OpportunityUpdatedEvent";

    /// Every event name the engine emits
    pub const ALL_NAMES: [&'static str; 3] = [
        Self::COMPANY_UPDATED,
        Self::CONTACT_UPDATED,
        Self::OPPORTUNITY_UPDATED,
    ];

    /// Creates a new event with a fresh id and the current time
    pub fn new(tenant_id: TenantId, payload: EventPayload) -> Self {
        Self {
            event_id: EventId::new_v7(),
            occurred_at: Utc::now(),
            tenant_id,
            payload,
            metadata: BTreeMap::new(),
            origin: None,
        }
    }

    pub fn company_updated(tenant_id: TenantId, entity_id: EntityId) -> Self {
        Self::new(tenant_id, EventPayload::CompanyUpdated { entity_id })
    }

    pub fn contact_updated(tenant_id: TenantId, entity_id: EntityId) -> Self {
        Self::new(tenant_id, EventPayload::ContactUpdated { entity_id })
    }

    pub fn opportunity_updated(tenant_id: TenantId, entity_id: EntityId) -> Self {
        Self::new(tenant_id, EventPayload::OpportunityUpdated { entity_id })
    }

    /// Creates the "updated" event matching an entity type
    pub fn entity_updated(tenant_id: TenantId, entity_type: EntityType, entity_id: EntityId) -> Self {
        Self::new(tenant_id, EventPayload::updated(entity_type, entity_id))
    }

    /// Attaches a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Marks the change as sourced from a CRM, so it is never echoed back there
    pub fn with_origin(mut self, origin: CrmSystem) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    pub fn event_name(&self) -> &'static str {
        self.payload.event_name()
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn entity_id(&self) -> EntityId {
        self.payload.entity_id()
    }

    pub fn entity_type(&self) -> EntityType {
        self.payload.entity_type()
    }

    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    /// The CRM this change came from, if it was sourced from one
    pub fn origin(&self) -> Option<CrmSystem> {
        self.origin
    }

    /// JSON rendition for structured logs
    pub fn to_log_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            serde_json::json!({
                "event_id": self.event_id.to_string(),
                "event_name": self.event_name(),
            })
        })
    }
}
