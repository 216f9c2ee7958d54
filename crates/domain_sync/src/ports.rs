//! External contracts of the sync engine
//!
//! The engine does not own business entity storage, CRM credentials or the
//! link table. It reaches each through a port:
//!
//! - **EntityRepository**: load a canonical entity, apply a partial update
//! - **ConnectionStore**: which CRMs a tenant has connected
//! - **EntityLinkStore**: internal id ↔ CRM id for each linked object
//!
//! PostgreSQL adapters for connections and links live in `infra_db`. Each
//! port has an in-memory adapter behind the `mock` feature.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use core_kernel::{CrmSystem, DomainPort, EntityId, EntityType, HealthCheckable, PortError, TenantId};
use domain_mapping::{CanonicalEntity, PartialUpdate};

use crate::client::ConnectionInfo;

/// Read/write access to canonical entities
#[async_trait]
pub trait EntityRepository: DomainPort + HealthCheckable {
    /// Loads an entity; `Ok(None)` when it does not exist
    async fn get(
        &self,
        tenant_id: TenantId,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> Result<Option<CanonicalEntity>, PortError>;

    /// Merges the update into the stored entity and returns the new state
    ///
    /// Fields the update does not name keep their values. Returns
    /// `PortError::NotFound` if the entity does not exist.
    async fn apply_partial_update(
        &self,
        tenant_id: TenantId,
        entity_type: EntityType,
        entity_id: EntityId,
        update: &PartialUpdate,
    ) -> Result<CanonicalEntity, PortError>;
}

/// Read-only access to tenants' CRM connections
#[async_trait]
pub trait ConnectionStore: DomainPort + HealthCheckable {
    /// Every connection the tenant has, including disabled ones
    async fn list_connected(&self, tenant_id: TenantId) -> Result<Vec<ConnectionInfo>, PortError>;
}

/// One row of the link table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityLink {
    pub tenant_id: TenantId,
    pub crm_system: CrmSystem,
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub external_id: String,
}

impl EntityLink {
    pub fn new(
        tenant_id: TenantId,
        crm_system: CrmSystem,
        entity_type: EntityType,
        entity_id: EntityId,
        external_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id,
            crm_system,
            entity_type,
            entity_id,
            external_id: external_id.into(),
        }
    }
}

/// The link table between internal entities and CRM objects
#[async_trait]
pub trait EntityLinkStore: DomainPort + HealthCheckable {
    /// Finds the tenant's entity a CRM object is linked to
    ///
    /// CRM object ids are only unique within one tenant's CRM account, so two
    /// tenants may link the same external id to different entities.
    async fn resolve_external_id(
        &self,
        tenant_id: TenantId,
        crm_system: CrmSystem,
        entity_type: EntityType,
        external_id: &str,
    ) -> Result<Option<EntityLink>, PortError>;

    /// Finds the CRM id an internal entity is linked to
    async fn find_external_id(
        &self,
        tenant_id: TenantId,
        crm_system: CrmSystem,
        entity_type: EntityType,
        entity_id: EntityId,
    ) -> Result<Option<String>, PortError>;

    /// Inserts the link, or repoints an existing one for the same entity
    async fn upsert_link(&self, link: EntityLink) -> Result<(), PortError>;
}

/// In-memory port adapters for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use chrono::Utc;
    use core_kernel::HealthCheckResult;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    type EntityKey = (TenantId, EntityType, EntityId);

    /// Entity store that stamps `updated_at` with the wall clock on update
    #[derive(Debug, Default)]
    pub struct InMemoryEntityRepository {
        entities: Arc<RwLock<HashMap<EntityKey, CanonicalEntity>>>,
        updates_applied: AtomicUsize,
        unavailable: AtomicBool,
    }

    impl InMemoryEntityRepository {
        pub fn new() -> Self {
            Self::default()
        }

        /// Pre-populates with entities for testing
        pub async fn with_entities(entities: Vec<CanonicalEntity>) -> Self {
            let repository = Self::new();
            for entity in entities {
                repository.insert(entity).await;
            }
            repository
        }

        pub async fn insert(&self, entity: CanonicalEntity) {
            self.entities
                .write()
                .await
                .insert((entity.tenant_id(), entity.entity_type(), entity.id()), entity);
        }

        pub async fn stored(
            &self,
            tenant_id: TenantId,
            entity_type: EntityType,
            entity_id: EntityId,
        ) -> Option<CanonicalEntity> {
            self.entities
                .read()
                .await
                .get(&(tenant_id, entity_type, entity_id))
                .cloned()
        }

        /// Number of successful `apply_partial_update` calls
        pub fn updates_applied(&self) -> usize {
            self.updates_applied.load(Ordering::SeqCst)
        }

        /// Makes every call fail with a connection error
        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }

        fn check_available(&self) -> Result<(), PortError> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(PortError::connection("entity repository unavailable"));
            }
            Ok(())
        }
    }

    impl DomainPort for InMemoryEntityRepository {}

    #[async_trait]
    impl HealthCheckable for InMemoryEntityRepository {
        async fn health_check(&self) -> HealthCheckResult {
            HealthCheckResult::healthy("mock-entity-repository", 0)
        }
    }

    #[async_trait]
    impl EntityRepository for InMemoryEntityRepository {
        async fn get(
            &self,
            tenant_id: TenantId,
            entity_type: EntityType,
            entity_id: EntityId,
        ) -> Result<Option<CanonicalEntity>, PortError> {
            self.check_available()?;
            Ok(self.stored(tenant_id, entity_type, entity_id).await)
        }

        async fn apply_partial_update(
            &self,
            tenant_id: TenantId,
            entity_type: EntityType,
            entity_id: EntityId,
            update: &PartialUpdate,
        ) -> Result<CanonicalEntity, PortError> {
            self.check_available()?;
            let mut entities = self.entities.write().await;
            let current = entities
                .get(&(tenant_id, entity_type, entity_id))
                .ok_or_else(|| PortError::not_found(entity_type.as_str(), entity_id))?;

            let updated = current
                .apply(update, Utc::now())
                .map_err(|e| PortError::validation(e.to_string()))?;

            entities.insert((tenant_id, entity_type, entity_id), updated.clone());
            self.updates_applied.fetch_add(1, Ordering::SeqCst);
            Ok(updated)
        }
    }

    /// Connection list per tenant
    #[derive(Debug, Default)]
    pub struct InMemoryConnectionStore {
        connections: Arc<RwLock<HashMap<TenantId, Vec<ConnectionInfo>>>>,
    }

    impl InMemoryConnectionStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn add(&self, connection: ConnectionInfo) {
            self.connections
                .write()
                .await
                .entry(connection.tenant_id)
                .or_default()
                .push(connection);
        }
    }

    impl DomainPort for InMemoryConnectionStore {}

    #[async_trait]
    impl HealthCheckable for InMemoryConnectionStore {
        async fn health_check(&self) -> HealthCheckResult {
            HealthCheckResult::healthy("mock-connection-store", 0)
        }
    }

    #[async_trait]
    impl ConnectionStore for InMemoryConnectionStore {
        async fn list_connected(&self, tenant_id: TenantId) -> Result<Vec<ConnectionInfo>, PortError> {
            Ok(self
                .connections
                .read()
                .await
                .get(&tenant_id)
                .cloned()
                .unwrap_or_default())
        }
    }

    /// Link table held in memory
    #[derive(Debug, Default)]
    pub struct InMemoryEntityLinkStore {
        links: Arc<RwLock<Vec<EntityLink>>>,
    }

    impl InMemoryEntityLinkStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn all(&self) -> Vec<EntityLink> {
            self.links.read().await.clone()
        }
    }

    impl DomainPort for InMemoryEntityLinkStore {}

    #[async_trait]
    impl HealthCheckable for InMemoryEntityLinkStore {
        async fn health_check(&self) -> HealthCheckResult {
            HealthCheckResult::healthy("mock-entity-link-store", 0)
        }
    }

    #[async_trait]
    impl EntityLinkStore for InMemoryEntityLinkStore {
        async fn resolve_external_id(
            &self,
            tenant_id: TenantId,
            crm_system: CrmSystem,
            entity_type: EntityType,
            external_id: &str,
        ) -> Result<Option<EntityLink>, PortError> {
            Ok(self
                .links
                .read()
                .await
                .iter()
                .find(|l| {
                    l.tenant_id == tenant_id
                        && l.crm_system == crm_system
                        && l.entity_type == entity_type
                        && l.external_id == external_id
                })
                .cloned())
        }

        async fn find_external_id(
            &self,
            tenant_id: TenantId,
            crm_system: CrmSystem,
            entity_type: EntityType,
            entity_id: EntityId,
        ) -> Result<Option<String>, PortError> {
            Ok(self
                .links
                .read()
                .await
                .iter()
                .find(|l| {
                    l.tenant_id == tenant_id
                        && l.crm_system == crm_system
                        && l.entity_type == entity_type
                        && l.entity_id == entity_id
                })
                .map(|l| l.external_id.clone()))
        }

        async fn upsert_link(&self, link: EntityLink) -> Result<(), PortError> {
            let mut links = self.links.write().await;
            links.retain(|l| {
                !(l.tenant_id == link.tenant_id
                    && l.crm_system == link.crm_system
                    && l.entity_type == link.entity_type
                    && l.entity_id == link.entity_id)
            });
            links.push(link);
            Ok(())
        }
    }
}
