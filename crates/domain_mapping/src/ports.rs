//! Mapping Rule Store Port
//!
//! The engine reads rules through this port and never writes to it. Rule
//! editing happens through a separately owned path.
//!
//! Adapters:
//! - **BuiltinRuleStore**: the shipped default catalog, no tenant overrides
//! - **PgMappingRuleStore** (infra_db): catalog plus rows from PostgreSQL
//! - **InMemoryRuleStore** (`mock` feature): editable in-memory rules for tests

use async_trait::async_trait;

use core_kernel::{CrmSystem, DomainPort, EntityType, PortError, TenantId};

use crate::defaults::builtin_default_rules;
use crate::rule::MappingRule;

/// Read-only access to mapping rules
#[async_trait]
pub trait MappingRuleStore: DomainPort {
    /// Rules in the default layer for a CRM and entity type
    async fn default_rules(
        &self,
        crm_system: CrmSystem,
        entity_type: EntityType,
    ) -> Result<Vec<MappingRule>, PortError>;

    /// A tenant's override rules, in application order
    async fn tenant_overrides(
        &self,
        tenant_id: TenantId,
        crm_system: CrmSystem,
        entity_type: EntityType,
    ) -> Result<Vec<MappingRule>, PortError>;
}

/// Serves the built-in catalog with no tenant overrides
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinRuleStore;

impl DomainPort for BuiltinRuleStore {}

#[async_trait]
impl MappingRuleStore for BuiltinRuleStore {
    async fn default_rules(
        &self,
        crm_system: CrmSystem,
        entity_type: EntityType,
    ) -> Result<Vec<MappingRule>, PortError> {
        Ok(builtin_default_rules(crm_system, entity_type))
    }

    async fn tenant_overrides(
        &self,
        _tenant_id: TenantId,
        _crm_system: CrmSystem,
        _entity_type: EntityType,
    ) -> Result<Vec<MappingRule>, PortError> {
        Ok(Vec::new())
    }
}

/// In-memory rule store for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    type DefaultsKey = (CrmSystem, EntityType);
    type OverridesKey = (TenantId, CrmSystem, EntityType);

    /// Rule store whose layers can be edited by the test
    ///
    /// Starts out serving the built-in catalog. `replace_defaults` swaps a
    /// layer out entirely.
    #[derive(Debug, Default)]
    pub struct InMemoryRuleStore {
        defaults: Arc<RwLock<HashMap<DefaultsKey, Vec<MappingRule>>>>,
        overrides: Arc<RwLock<HashMap<OverridesKey, Vec<MappingRule>>>>,
        unavailable: AtomicBool,
    }

    impl InMemoryRuleStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Replaces the default layer for a CRM and entity type
        pub async fn replace_defaults(
            &self,
            crm_system: CrmSystem,
            entity_type: EntityType,
            rules: Vec<MappingRule>,
        ) {
            self.defaults
                .write()
                .await
                .insert((crm_system, entity_type), rules);
        }

        /// Appends a tenant override; the rule's scope must name the tenant
        pub async fn add_override(&self, tenant_id: TenantId, rule: MappingRule) {
            self.overrides
                .write()
                .await
                .entry((tenant_id, rule.crm_system, rule.entity_type))
                .or_default()
                .push(rule);
        }

        /// Makes every read fail with a connection error
        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }

        fn check_available(&self) -> Result<(), PortError> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(PortError::connection("rule store unavailable"));
            }
            Ok(())
        }
    }

    impl DomainPort for InMemoryRuleStore {}

    #[async_trait]
    impl MappingRuleStore for InMemoryRuleStore {
        async fn default_rules(
            &self,
            crm_system: CrmSystem,
            entity_type: EntityType,
        ) -> Result<Vec<MappingRule>, PortError> {
            self.check_available()?;
            Ok(self
                .defaults
                .read()
                .await
                .get(&(crm_system, entity_type))
                .cloned()
                .unwrap_or_else(|| builtin_default_rules(crm_system, entity_type)))
        }

        async fn tenant_overrides(
            &self,
            tenant_id: TenantId,
            crm_system: CrmSystem,
            entity_type: EntityType,
        ) -> Result<Vec<MappingRule>, PortError> {
            self.check_available()?;
            Ok(self
                .overrides
                .read()
                .await
                .get(&(tenant_id, crm_system, entity_type))
                .cloned()
                .unwrap_or_default())
        }
    }
}
