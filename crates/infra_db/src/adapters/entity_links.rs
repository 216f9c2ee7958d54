//! PostgreSQL Entity Link Store

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, instrument};

use core_kernel::{
    CrmSystem, DomainPort, EntityId, EntityType, HealthCheckResult, HealthCheckable, PortError,
    TenantId,
};
use domain_sync::{EntityLink, EntityLinkStore};

use super::check_pool;
use crate::repositories::EntityLinkRepository;

/// `EntityLinkStore` backed by `crm_entity_links`
#[derive(Debug, Clone)]
pub struct PgEntityLinkStore {
    repository: EntityLinkRepository,
    pool: PgPool,
}

impl PgEntityLinkStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: EntityLinkRepository::new(pool.clone()),
            pool,
        }
    }
}

impl DomainPort for PgEntityLinkStore {}

#[async_trait]
impl HealthCheckable for PgEntityLinkStore {
    async fn health_check(&self) -> HealthCheckResult {
        check_pool(&self.pool, "postgres-entity-link-store").await
    }
}

#[async_trait]
impl EntityLinkStore for PgEntityLinkStore {
    #[instrument(skip(self), fields(tenant_id = %tenant_id, crm_system = %crm_system, entity_type = %entity_type))]
    async fn resolve_external_id(
        &self,
        tenant_id: TenantId,
        crm_system: CrmSystem,
        entity_type: EntityType,
        external_id: &str,
    ) -> Result<Option<EntityLink>, PortError> {
        let row = self
            .repository
            .find_by_external_id(tenant_id, crm_system, entity_type, external_id)
            .await?;
        Ok(row.map(|r| r.into_link()).transpose()?)
    }

    async fn find_external_id(
        &self,
        tenant_id: TenantId,
        crm_system: CrmSystem,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> Result<Option<String>, PortError> {
        Ok(self
            .repository
            .find_external_id(tenant_id, crm_system, entity_type, entity_id)
            .await?)
    }

    #[instrument(skip(self, link), fields(tenant_id = %link.tenant_id, crm_system = %link.crm_system, entity_id = %link.entity_id))]
    async fn upsert_link(&self, link: EntityLink) -> Result<(), PortError> {
        self.repository.upsert(&link).await?;
        debug!(external_id = %link.external_id, "entity link stored");
        Ok(())
    }
}
