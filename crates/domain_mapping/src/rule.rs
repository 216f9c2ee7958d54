//! Mapping rules and rule-set resolution
//!
//! A rule binds one canonical field path to one CRM field for a
//! `(scope, crm_system, entity_type)` triple. Effective rules come from two
//! layers: the defaults for the CRM and entity type, then the tenant's own
//! rules applied on top field by field. Resolution is a pure function so it
//! can be exercised without any store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use core_kernel::{CoreError, CrmSystem, EntityType, TenantId};

use crate::entity::validate_path;
use crate::error::MappingError;

/// Which layer a rule belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "tenant_id")]
pub enum RuleScope {
    Default,
    Tenant(TenantId),
}

/// What to do when the canonical value is absent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullPolicy {
    /// Leave the CRM field out of the payload
    #[default]
    Omit,
    /// Send an explicit null so the CRM clears the field
    SendNullOnClear,
}

impl NullPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            NullPolicy::Omit => "omit",
            NullPolicy::SendNullOnClear => "send_null_on_clear",
        }
    }
}

impl fmt::Display for NullPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NullPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "omit" => Ok(NullPolicy::Omit),
            "send_null_on_clear" => Ok(NullPolicy::SendNullOnClear),
            other => Err(CoreError::unknown_tag("null policy", other)),
        }
    }
}

/// Which way a rule carries data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingDirection {
    /// Canonical → CRM only
    Outbound,
    /// CRM → canonical only
    Inbound,
    #[default]
    Bidirectional,
}

impl MappingDirection {
    pub fn is_outbound(&self) -> bool {
        matches!(self, MappingDirection::Outbound | MappingDirection::Bidirectional)
    }

    pub fn is_inbound(&self) -> bool {
        matches!(self, MappingDirection::Inbound | MappingDirection::Bidirectional)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MappingDirection::Outbound => "outbound",
            MappingDirection::Inbound => "inbound",
            MappingDirection::Bidirectional => "bidirectional",
        }
    }
}

impl fmt::Display for MappingDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MappingDirection {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "outbound" => Ok(MappingDirection::Outbound),
            "inbound" => Ok(MappingDirection::Inbound),
            "" | "bidirectional" => Ok(MappingDirection::Bidirectional),
            other => Err(CoreError::unknown_tag("mapping direction", other)),
        }
    }
}

/// Binding of one canonical field to one CRM field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MappingRule {
    pub scope: RuleScope,
    pub crm_system: CrmSystem,
    pub entity_type: EntityType,
    /// Dot-separated path into the canonical entity
    pub canonical_field: String,
    /// Field identifier on the CRM side
    pub crm_field: String,
    #[serde(default)]
    pub null_policy: NullPolicy,
    #[serde(default)]
    pub direction: MappingDirection,
}

impl MappingRule {
    /// A rule in the default layer
    pub fn default_rule(
        crm_system: CrmSystem,
        entity_type: EntityType,
        canonical_field: impl Into<String>,
        crm_field: impl Into<String>,
    ) -> Self {
        Self {
            scope: RuleScope::Default,
            crm_system,
            entity_type,
            canonical_field: canonical_field.into(),
            crm_field: crm_field.into(),
            null_policy: NullPolicy::Omit,
            direction: MappingDirection::Bidirectional,
        }
    }

    /// A rule in a tenant's override layer
    pub fn tenant_rule(
        tenant_id: TenantId,
        crm_system: CrmSystem,
        entity_type: EntityType,
        canonical_field: impl Into<String>,
        crm_field: impl Into<String>,
    ) -> Self {
        Self {
            scope: RuleScope::Tenant(tenant_id),
            ..Self::default_rule(crm_system, entity_type, canonical_field, crm_field)
        }
    }

    pub fn with_null_policy(mut self, null_policy: NullPolicy) -> Self {
        self.null_policy = null_policy;
        self
    }

    pub fn with_direction(mut self, direction: MappingDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Checks the canonical path and the CRM field are usable
    pub fn validate(&self) -> Result<(), MappingError> {
        validate_path(&self.canonical_field)?;
        if self.crm_field.trim().is_empty() {
            return Err(MappingError::InvalidPath(format!(
                "empty CRM field for '{}'",
                self.canonical_field
            )));
        }
        Ok(())
    }
}

/// Effective rules for one `(tenant, crm_system, entity_type)`, keyed by canonical field
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedRuleSet {
    rules: BTreeMap<String, MappingRule>,
}

impl ResolvedRuleSet {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// The effective rule for a canonical field, if any
    pub fn get(&self, canonical_field: &str) -> Option<&MappingRule> {
        self.rules.get(canonical_field)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MappingRule> {
        self.rules.values()
    }

    /// Rules that carry data from the canonical entity to the CRM
    pub fn outbound(&self) -> impl Iterator<Item = &MappingRule> {
        self.rules.values().filter(|r| r.direction.is_outbound())
    }

    /// Rules that carry data from the CRM to the canonical entity
    pub fn inbound(&self) -> impl Iterator<Item = &MappingRule> {
        self.rules.values().filter(|r| r.direction.is_inbound())
    }
}

/// Merges the default layer with tenant overrides
///
/// Rules are applied in order, defaults first, and a later rule for the same
/// canonical field replaces an earlier one. Malformed rules are skipped with a
/// warning rather than failing the whole set.
pub fn resolve_rules(defaults: &[MappingRule], tenant_overrides: &[MappingRule]) -> ResolvedRuleSet {
    let mut rules = BTreeMap::new();

    for rule in defaults.iter().chain(tenant_overrides.iter()) {
        if let Err(e) = rule.validate() {
            warn!(
                crm_system = %rule.crm_system,
                entity_type = %rule.entity_type,
                canonical_field = %rule.canonical_field,
                error = %e,
                "skipping malformed mapping rule"
            );
            continue;
        }
        rules.insert(rule.canonical_field.clone(), rule.clone());
    }

    ResolvedRuleSet { rules }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HS: CrmSystem = CrmSystem::HubSpot;
    const CO: EntityType = EntityType::Company;

    #[test]
    fn test_tenant_rule_overrides_default_for_same_field() {
        let tenant = TenantId::new();
        let defaults = vec![
            MappingRule::default_rule(HS, CO, "name", "name"),
            MappingRule::default_rule(HS, CO, "domain", "domain"),
        ];
        let overrides = vec![MappingRule::tenant_rule(tenant, HS, CO, "name", "company_name__c")];

        let resolved = resolve_rules(&defaults, &overrides);

        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved.get("name").unwrap().crm_field, "company_name__c");
        assert_eq!(resolved.get("name").unwrap().scope, RuleScope::Tenant(tenant));
        assert_eq!(resolved.get("domain").unwrap().crm_field, "domain");
    }

    #[test]
    fn test_last_applied_wins_within_a_layer() {
        let defaults = vec![
            MappingRule::default_rule(HS, CO, "phone", "phone"),
            MappingRule::default_rule(HS, CO, "phone", "phone_number"),
        ];
        let resolved = resolve_rules(&defaults, &[]);
        assert_eq!(resolved.get("phone").unwrap().crm_field, "phone_number");
    }

    #[test]
    fn test_malformed_rules_are_skipped() {
        let defaults = vec![
            MappingRule::default_rule(HS, CO, "id", "hs_object_id"),
            MappingRule::default_rule(HS, CO, "name", " "),
            MappingRule::default_rule(HS, CO, "domain", "domain"),
        ];
        let resolved = resolve_rules(&defaults, &[]);
        assert_eq!(resolved.len(), 1);
        assert!(resolved.get("domain").is_some());
    }

    #[test]
    fn test_direction_filters() {
        let defaults = vec![
            MappingRule::default_rule(HS, CO, "name", "name"),
            MappingRule::default_rule(HS, CO, "industry", "industry")
                .with_direction(MappingDirection::Inbound),
            MappingRule::default_rule(HS, CO, "website", "website")
                .with_direction(MappingDirection::Outbound),
        ];
        let resolved = resolve_rules(&defaults, &[]);

        let outbound: Vec<_> = resolved.outbound().map(|r| r.canonical_field.as_str()).collect();
        let inbound: Vec<_> = resolved.inbound().map(|r| r.canonical_field.as_str()).collect();
        assert_eq!(outbound, vec!["name", "website"]);
        assert_eq!(inbound, vec!["industry", "name"]);
    }

    #[test]
    fn test_direction_parsing() {
        assert_eq!("Outbound".parse::<MappingDirection>().unwrap(), MappingDirection::Outbound);
        assert_eq!("".parse::<MappingDirection>().unwrap(), MappingDirection::Bidirectional);
        assert!("sideways".parse::<MappingDirection>().is_err());
    }

    #[test]
    fn test_null_policy_tags() {
        assert_eq!("send_null_on_clear".parse::<NullPolicy>().unwrap(), NullPolicy::SendNullOnClear);
        assert_eq!(NullPolicy::Omit.to_string(), "omit");
        assert!("clear".parse::<NullPolicy>().is_err());
    }
}
