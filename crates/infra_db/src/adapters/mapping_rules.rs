//! PostgreSQL Mapping Rule Store
//!
//! The default layer is the built-in catalog followed by the global rows in
//! `crm_field_mappings`, so a global row for a field replaces the shipped
//! rule. Tenant rows form the override layer.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, instrument};

use core_kernel::{CrmSystem, DomainPort, EntityType, HealthCheckResult, HealthCheckable, PortError, TenantId};
use domain_mapping::{builtin_default_rules, MappingRule, MappingRuleStore};

use super::check_pool;
use crate::error::DatabaseError;
use crate::repositories::{FieldMappingRepository, FieldMappingRow};

/// `MappingRuleStore` backed by `crm_field_mappings`
#[derive(Debug, Clone)]
pub struct PgMappingRuleStore {
    repository: FieldMappingRepository,
    pool: PgPool,
}

impl PgMappingRuleStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: FieldMappingRepository::new(pool.clone()),
            pool,
        }
    }

    /// Returns the underlying repository, e.g. for provisioning rules
    pub fn repository(&self) -> &FieldMappingRepository {
        &self.repository
    }
}

fn into_rules(rows: Vec<FieldMappingRow>) -> Result<Vec<MappingRule>, DatabaseError> {
    rows.into_iter().map(FieldMappingRow::into_rule).collect()
}

impl DomainPort for PgMappingRuleStore {}

#[async_trait]
impl HealthCheckable for PgMappingRuleStore {
    async fn health_check(&self) -> HealthCheckResult {
        check_pool(&self.pool, "postgres-mapping-rule-store").await
    }
}

#[async_trait]
impl MappingRuleStore for PgMappingRuleStore {
    #[instrument(skip(self), fields(crm_system = %crm_system, entity_type = %entity_type))]
    async fn default_rules(
        &self,
        crm_system: CrmSystem,
        entity_type: EntityType,
    ) -> Result<Vec<MappingRule>, PortError> {
        let stored = into_rules(self.repository.list_defaults(crm_system, entity_type).await?)?;
        debug!(stored = stored.len(), "loaded global mapping rows");

        let mut rules = builtin_default_rules(crm_system, entity_type);
        rules.extend(stored);
        Ok(rules)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, crm_system = %crm_system, entity_type = %entity_type))]
    async fn tenant_overrides(
        &self,
        tenant_id: TenantId,
        crm_system: CrmSystem,
        entity_type: EntityType,
    ) -> Result<Vec<MappingRule>, PortError> {
        let rows = self
            .repository
            .list_tenant_overrides(tenant_id, crm_system, entity_type)
            .await?;
        Ok(into_rules(rows)?)
    }
}
