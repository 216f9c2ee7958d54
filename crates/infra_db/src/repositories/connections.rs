//! CRM connection repository

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use core_kernel::{CrmSystem, TenantId};
use domain_sync::ConnectionInfo;

use crate::error::DatabaseError;

const TABLE: &str = "crm_connections";

/// Database row for a tenant's connection to one CRM
#[derive(Clone, sqlx::FromRow)]
pub struct ConnectionRow {
    pub tenant_id: Uuid,
    pub crm_system: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub enabled: bool,
}

impl ConnectionRow {
    pub fn into_connection(self) -> Result<ConnectionInfo, DatabaseError> {
        let crm_system = self
            .crm_system
            .parse::<CrmSystem>()
            .map_err(|e| DatabaseError::corrupt_row(TABLE, e))?;
        Ok(ConnectionInfo {
            tenant_id: TenantId::from_uuid(self.tenant_id),
            crm_system,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self.expires_at,
            enabled: self.enabled,
        })
    }
}

// Tokens stay out of logs
impl std::fmt::Debug for ConnectionRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRow")
            .field("tenant_id", &self.tenant_id)
            .field("crm_system", &self.crm_system)
            .field("expires_at", &self.expires_at)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// Repository for CRM connections
#[derive(Debug, Clone)]
pub struct ConnectionRepository {
    pool: PgPool,
}

impl ConnectionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Every connection of a tenant, enabled or not, in CRM order
    pub async fn list_for_tenant(&self, tenant_id: TenantId) -> Result<Vec<ConnectionRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, ConnectionRow>(
            r#"
            SELECT tenant_id, crm_system, access_token, refresh_token, expires_at, enabled
            FROM crm_connections
            WHERE tenant_id = $1
            ORDER BY crm_system
            "#,
        )
        .bind(Uuid::from(tenant_id))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Creates or replaces the tenant's connection to the CRM
    pub async fn upsert(&self, connection: &ConnectionInfo) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO crm_connections
                (tenant_id, crm_system, access_token, refresh_token, expires_at, enabled)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (tenant_id, crm_system) DO UPDATE SET
                access_token = EXCLUDED.access_token,
                refresh_token = EXCLUDED.refresh_token,
                expires_at = EXCLUDED.expires_at,
                enabled = EXCLUDED.enabled
            "#,
        )
        .bind(Uuid::from(connection.tenant_id))
        .bind(connection.crm_system.as_str())
        .bind(&connection.access_token)
        .bind(&connection.refresh_token)
        .bind(connection.expires_at)
        .bind(connection.enabled)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(crm_system: &str) -> ConnectionRow {
        ConnectionRow {
            tenant_id: Uuid::new_v4(),
            crm_system: crm_system.to_string(),
            access_token: "secret-access".to_string(),
            refresh_token: Some("secret-refresh".to_string()),
            expires_at: None,
            enabled: false,
        }
    }

    #[test]
    fn test_row_into_connection() {
        let connection = row("salesforce").into_connection().unwrap();
        assert_eq!(connection.crm_system, CrmSystem::Salesforce);
        assert_eq!(connection.refresh_token.as_deref(), Some("secret-refresh"));
        assert!(!connection.enabled);
    }

    #[test]
    fn test_debug_hides_tokens() {
        let rendered = format!("{:?}", row("hubspot"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn test_unknown_crm_is_corrupt_row() {
        assert!(row("zoho").into_connection().is_err());
    }
}
