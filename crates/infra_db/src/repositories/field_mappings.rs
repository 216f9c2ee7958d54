//! Field mapping repository
//!
//! `crm_field_mappings` holds both layers: rows with a NULL `tenant_id` are
//! global defaults, rows with a tenant are that tenant's overrides. Rows come
//! back ordered by `position` then insertion, which is the order the rule
//! resolution applies them in.

use sqlx::PgPool;
use uuid::Uuid;

use core_kernel::{CrmSystem, EntityType, TenantId};
use domain_mapping::{MappingRule, RuleScope};

use crate::error::DatabaseError;

const TABLE: &str = "crm_field_mappings";

/// Database row for one mapping rule
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FieldMappingRow {
    pub tenant_id: Option<Uuid>,
    pub crm_system: String,
    pub entity_type: String,
    pub canonical_field: String,
    pub crm_field: String,
    pub null_policy: String,
    pub direction: String,
}

impl FieldMappingRow {
    pub fn into_rule(self) -> Result<MappingRule, DatabaseError> {
        let corrupt = |e: core_kernel::CoreError| DatabaseError::corrupt_row(TABLE, e);
        Ok(MappingRule {
            scope: match self.tenant_id {
                Some(tenant_id) => RuleScope::Tenant(TenantId::from_uuid(tenant_id)),
                None => RuleScope::Default,
            },
            crm_system: self.crm_system.parse().map_err(corrupt)?,
            entity_type: self.entity_type.parse().map_err(corrupt)?,
            canonical_field: self.canonical_field,
            crm_field: self.crm_field,
            null_policy: self.null_policy.parse().map_err(corrupt)?,
            direction: self.direction.parse().map_err(corrupt)?,
        })
    }
}

/// Repository for mapping rule rows
#[derive(Debug, Clone)]
pub struct FieldMappingRepository {
    pool: PgPool,
}

impl FieldMappingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Global default rows for a CRM and entity type
    pub async fn list_defaults(
        &self,
        crm_system: CrmSystem,
        entity_type: EntityType,
    ) -> Result<Vec<FieldMappingRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, FieldMappingRow>(
            r#"
            SELECT tenant_id, crm_system, entity_type, canonical_field, crm_field, null_policy, direction
            FROM crm_field_mappings
            WHERE tenant_id IS NULL AND crm_system = $1 AND entity_type = $2
            ORDER BY position, id
            "#,
        )
        .bind(crm_system.as_str())
        .bind(entity_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// A tenant's override rows for a CRM and entity type
    pub async fn list_tenant_overrides(
        &self,
        tenant_id: TenantId,
        crm_system: CrmSystem,
        entity_type: EntityType,
    ) -> Result<Vec<FieldMappingRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, FieldMappingRow>(
            r#"
            SELECT tenant_id, crm_system, entity_type, canonical_field, crm_field, null_policy, direction
            FROM crm_field_mappings
            WHERE tenant_id = $1 AND crm_system = $2 AND entity_type = $3
            ORDER BY position, id
            "#,
        )
        .bind(Uuid::from(tenant_id))
        .bind(crm_system.as_str())
        .bind(entity_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Stores a rule in the layer its scope names
    ///
    /// The engine only reads rules; this is for provisioning and tests.
    pub async fn insert(&self, rule: &MappingRule, position: i32) -> Result<(), DatabaseError> {
        let tenant_id = match rule.scope {
            RuleScope::Tenant(tenant_id) => Some(Uuid::from(tenant_id)),
            RuleScope::Default => None,
        };

        sqlx::query(
            r#"
            INSERT INTO crm_field_mappings
                (tenant_id, crm_system, entity_type, canonical_field, crm_field, null_policy, direction, position)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(tenant_id)
        .bind(rule.crm_system.as_str())
        .bind(rule.entity_type.as_str())
        .bind(&rule.canonical_field)
        .bind(&rule.crm_field)
        .bind(rule.null_policy.as_str())
        .bind(rule.direction.as_str())
        .bind(position)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
