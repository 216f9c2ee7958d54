//! Entity link repository
//!
//! `crm_entity_links` maps each canonical entity to its object id in a CRM.
//! Both directions are unique within a tenant, so a tenant's CRM object is
//! linked to at most one entity and an entity to at most one object per CRM.

use sqlx::PgPool;
use uuid::Uuid;

use core_kernel::{CrmSystem, EntityId, EntityType, TenantId};
use domain_sync::EntityLink;

use crate::error::DatabaseError;

const TABLE: &str = "crm_entity_links";

/// Database row for one link
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EntityLinkRow {
    pub tenant_id: Uuid,
    pub crm_system: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub external_id: String,
}

impl EntityLinkRow {
    pub fn into_link(self) -> Result<EntityLink, DatabaseError> {
        let corrupt = |e: core_kernel::CoreError| DatabaseError::corrupt_row(TABLE, e);
        Ok(EntityLink {
            tenant_id: TenantId::from_uuid(self.tenant_id),
            crm_system: self.crm_system.parse().map_err(corrupt)?,
            entity_type: self.entity_type.parse().map_err(corrupt)?,
            entity_id: EntityId::from_uuid(self.entity_id),
            external_id: self.external_id,
        })
    }
}

/// Repository for entity links
#[derive(Debug, Clone)]
pub struct EntityLinkRepository {
    pool: PgPool,
}

impl EntityLinkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_external_id(
        &self,
        tenant_id: TenantId,
        crm_system: CrmSystem,
        entity_type: EntityType,
        external_id: &str,
    ) -> Result<Option<EntityLinkRow>, DatabaseError> {
        let row = sqlx::query_as::<_, EntityLinkRow>(
            r#"
            SELECT tenant_id, crm_system, entity_type, entity_id, external_id
            FROM crm_entity_links
            WHERE tenant_id = $1 AND crm_system = $2 AND entity_type = $3 AND external_id = $4
            "#,
        )
        .bind(Uuid::from(tenant_id))
        .bind(crm_system.as_str())
        .bind(entity_type.as_str())
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn find_external_id(
        &self,
        tenant_id: TenantId,
        crm_system: CrmSystem,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> Result<Option<String>, DatabaseError> {
        let external_id = sqlx::query_scalar(
            r#"
            SELECT external_id
            FROM crm_entity_links
            WHERE tenant_id = $1 AND crm_system = $2 AND entity_type = $3 AND entity_id = $4
            "#,
        )
        .bind(Uuid::from(tenant_id))
        .bind(crm_system.as_str())
        .bind(entity_type.as_str())
        .bind(Uuid::from(entity_id))
        .fetch_optional(&self.pool)
        .await?;

        Ok(external_id)
    }

    /// Creates the link or points the entity's existing link at a new object
    ///
    /// Fails with `DuplicateEntry` when the tenant's CRM object is already
    /// linked to a different entity.
    pub async fn upsert(&self, link: &EntityLink) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO crm_entity_links (tenant_id, crm_system, entity_type, entity_id, external_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (tenant_id, crm_system, entity_type, entity_id)
            DO UPDATE SET external_id = EXCLUDED.external_id, updated_at = now()
            "#,
        )
        .bind(Uuid::from(link.tenant_id))
        .bind(link.crm_system.as_str())
        .bind(link.entity_type.as_str())
        .bind(Uuid::from(link.entity_id))
        .bind(&link.external_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
