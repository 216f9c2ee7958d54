//! PostgreSQL Connection Store

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use core_kernel::{DomainPort, HealthCheckResult, HealthCheckable, PortError, TenantId};
use domain_sync::{ConnectionInfo, ConnectionStore};

use super::check_pool;
use crate::error::DatabaseError;
use crate::repositories::{ConnectionRepository, ConnectionRow};

/// `ConnectionStore` backed by `crm_connections`
#[derive(Debug, Clone)]
pub struct PgConnectionStore {
    repository: ConnectionRepository,
    pool: PgPool,
}

impl PgConnectionStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: ConnectionRepository::new(pool.clone()),
            pool,
        }
    }

    /// Returns the underlying repository, e.g. for provisioning connections
    pub fn repository(&self) -> &ConnectionRepository {
        &self.repository
    }
}

impl DomainPort for PgConnectionStore {}

#[async_trait]
impl HealthCheckable for PgConnectionStore {
    async fn health_check(&self) -> HealthCheckResult {
        check_pool(&self.pool, "postgres-connection-store").await
    }
}

#[async_trait]
impl ConnectionStore for PgConnectionStore {
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn list_connected(&self, tenant_id: TenantId) -> Result<Vec<ConnectionInfo>, PortError> {
        let rows = self.repository.list_for_tenant(tenant_id).await?;
        let connections = rows
            .into_iter()
            .map(ConnectionRow::into_connection)
            .collect::<Result<Vec<_>, DatabaseError>>()?;
        Ok(connections)
    }
}
