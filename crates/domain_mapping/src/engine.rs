//! Field Mapping Engine
//!
//! Deterministic translation between canonical entities and CRM payloads.
//! The async methods only add rule loading on top of the pure
//! `*_with_rules` functions, which hold all of the translation logic.

use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, instrument};

use core_kernel::{CrmSystem, EntityType, TenantId};

use crate::entity::{get_path, CanonicalEntity, PartialUpdate};
use crate::error::MappingError;
use crate::ports::MappingRuleStore;
use crate::rule::{resolve_rules, NullPolicy, ResolvedRuleSet};

/// CRM-addressable representation of one entity
///
/// Only the mapping engine creates payloads. The orchestrator may attach the
/// CRM's own id once it is known from the link table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrmPayload {
    entity_type: EntityType,
    #[serde(skip_serializing_if = "Option::is_none")]
    crm_id: Option<String>,
    properties: Map<String, Value>,
}

impl CrmPayload {
    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    /// The CRM's id for the object; absent when it has to be created
    pub fn crm_id(&self) -> Option<&str> {
        self.crm_id.as_deref()
    }

    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn with_crm_id(mut self, crm_id: impl Into<String>) -> Self {
        self.crm_id = Some(crm_id.into());
        self
    }
}

/// Builds a payload from an entity and an already resolved rule set
pub fn build_payload_with_rules(
    entity: &CanonicalEntity,
    rules: &ResolvedRuleSet,
) -> Result<CrmPayload, MappingError> {
    let fields = entity.to_field_map()?;
    let mut properties = Map::new();

    for rule in rules.outbound() {
        match get_path(&fields, &rule.canonical_field) {
            Some(value) => {
                properties.insert(rule.crm_field.clone(), value.clone());
            }
            None if rule.null_policy == NullPolicy::SendNullOnClear => {
                properties.insert(rule.crm_field.clone(), Value::Null);
            }
            None => {}
        }
    }

    Ok(CrmPayload {
        entity_type: entity.entity_type(),
        crm_id: None,
        properties,
    })
}

/// Inverse lookup: CRM fields present in `raw` become canonical updates
pub fn parse_inbound_with_rules(raw: &Map<String, Value>, rules: &ResolvedRuleSet) -> PartialUpdate {
    rules
        .inbound()
        .filter_map(|rule| {
            raw.get(&rule.crm_field)
                .map(|value| (rule.canonical_field.clone(), value.clone()))
        })
        .collect()
}

/// Mapping engine backed by a rule store
#[derive(Clone)]
pub struct MappingEngine {
    store: Arc<dyn MappingRuleStore>,
}

impl MappingEngine {
    pub fn new(store: Arc<dyn MappingRuleStore>) -> Self {
        Self { store }
    }

    /// Loads both rule layers and resolves them
    pub async fn resolve(
        &self,
        tenant_id: TenantId,
        crm_system: CrmSystem,
        entity_type: EntityType,
    ) -> Result<ResolvedRuleSet, MappingError> {
        let defaults = self.store.default_rules(crm_system, entity_type).await?;
        let overrides = self
            .store
            .tenant_overrides(tenant_id, crm_system, entity_type)
            .await?;

        let resolved = resolve_rules(&defaults, &overrides);
        if resolved.is_empty() {
            debug!(
                tenant_id = %tenant_id,
                crm_system = %crm_system,
                entity_type = %entity_type,
                "no mapping rules resolved"
            );
        }
        Ok(resolved)
    }

    /// Translates a canonical entity into a payload for one CRM
    #[instrument(skip(self, entity), fields(entity_id = %entity.id()))]
    pub async fn build_payload(
        &self,
        entity: &CanonicalEntity,
        tenant_id: TenantId,
        crm_system: CrmSystem,
        entity_type: EntityType,
    ) -> Result<CrmPayload, MappingError> {
        if entity.entity_type() != entity_type {
            return Err(MappingError::EntityTypeMismatch {
                expected: entity_type,
                actual: entity.entity_type(),
            });
        }

        let rules = self.resolve(tenant_id, crm_system, entity_type).await?;
        let payload = build_payload_with_rules(entity, &rules)?;

        debug!(properties = payload.properties().len(), "payload built");
        Ok(payload)
    }

    /// Translates raw CRM fields into a partial canonical update
    #[instrument(skip(self, raw), fields(raw_fields = raw.len()))]
    pub async fn parse_inbound(
        &self,
        raw: &Map<String, Value>,
        tenant_id: TenantId,
        crm_system: CrmSystem,
        entity_type: EntityType,
    ) -> Result<PartialUpdate, MappingError> {
        let rules = self.resolve(tenant_id, crm_system, entity_type).await?;
        let update = parse_inbound_with_rules(raw, &rules);

        debug!(mapped_fields = update.len(), "inbound fields parsed");
        Ok(update)
    }
}

impl std::fmt::Debug for MappingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingEngine").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Company;
    use crate::rule::{MappingDirection, MappingRule};
    use core_kernel::EntityId;
    use serde_json::json;

    fn acme() -> CanonicalEntity {
        let mut company = Company::new(TenantId::new(), EntityId::new());
        company.name = Some("Acme".to_string());
        company.domain = Some("acme.io".to_string());
        CanonicalEntity::Company(company)
    }

    fn rules(extra: Vec<MappingRule>) -> ResolvedRuleSet {
        let base = vec![
            MappingRule::default_rule(CrmSystem::HubSpot, EntityType::Company, "name", "name"),
            MappingRule::default_rule(CrmSystem::HubSpot, EntityType::Company, "domain", "domain"),
            MappingRule::default_rule(
                CrmSystem::HubSpot,
                EntityType::Company,
                "employees",
                "numberofemployees",
            ),
        ];
        resolve_rules(&base, &extra)
    }

    #[test]
    fn test_absent_values_are_omitted() {
        let payload = build_payload_with_rules(&acme(), &rules(vec![])).unwrap();
        assert_eq!(
            payload.properties(),
            json!({"name": "Acme", "domain": "acme.io"}).as_object().unwrap()
        );
        assert!(payload.crm_id().is_none());
    }

    #[test]
    fn test_send_null_on_clear() {
        let tenant = TenantId::new();
        let override_rule = MappingRule::tenant_rule(
            tenant,
            CrmSystem::HubSpot,
            EntityType::Company,
            "employees",
            "numberofemployees",
        )
        .with_null_policy(NullPolicy::SendNullOnClear);

        let payload = build_payload_with_rules(&acme(), &rules(vec![override_rule])).unwrap();
        assert_eq!(payload.properties().get("numberofemployees"), Some(&Value::Null));
    }

    #[test]
    fn test_inbound_only_rule_not_sent() {
        let tenant = TenantId::new();
        let override_rule =
            MappingRule::tenant_rule(tenant, CrmSystem::HubSpot, EntityType::Company, "name", "name")
                .with_direction(MappingDirection::Inbound);

        let payload = build_payload_with_rules(&acme(), &rules(vec![override_rule])).unwrap();
        assert!(!payload.properties().contains_key("name"));
    }

    #[test]
    fn test_parse_inbound_ignores_unmapped_fields() {
        let raw = json!({"name": "Acme Corp", "hs_lead_status": "NEW"});
        let update = parse_inbound_with_rules(raw.as_object().unwrap(), &rules(vec![]));

        assert_eq!(update.len(), 1);
        assert_eq!(update.get("name"), Some(&json!("Acme Corp")));
    }

    #[test]
    fn test_empty_rule_set_yields_empty_payload() {
        let payload = build_payload_with_rules(&acme(), &ResolvedRuleSet::default()).unwrap();
        assert!(payload.is_empty());
    }

    #[test]
    fn test_with_crm_id() {
        let payload = build_payload_with_rules(&acme(), &rules(vec![]))
            .unwrap()
            .with_crm_id("9001");
        assert_eq!(payload.crm_id(), Some("9001"));
        assert_eq!(serde_json::to_value(&payload).unwrap()["crm_id"], "9001");
    }
}
