//! Database Test Utilities
//!
//! Starts PostgreSQL in a test container, applies the sync migrations and
//! hands out the `infra_db` adapters over its pool.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};

use infra_db::{
    run_migrations, PgConnectionStore, PgEntityLinkStore, PgIdempotencyLedger, PgMappingRuleStore,
    REQUIRED_TABLES,
};

const POSTGRES_IMAGE: &str = "postgres";
const POSTGRES_TAG: &str = "16-alpine";
const POSTGRES_USER: &str = "test_user";
const POSTGRES_PASSWORD: &str = "test_password";
const POSTGRES_DB: &str = "crm_sync_test";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Connection settings for the test database
#[derive(Debug, Clone)]
pub struct TestDatabaseConfig {
    pub user: String,
    pub password: String,
    pub database: String,
    pub host: String,
    pub port: u16,
}

impl Default for TestDatabaseConfig {
    fn default() -> Self {
        Self {
            user: POSTGRES_USER.to_string(),
            password: POSTGRES_PASSWORD.to_string(),
            database: POSTGRES_DB.to_string(),
            host: "localhost".to_string(),
            port: 5432,
        }
    }
}

impl TestDatabaseConfig {
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

/// A PostgreSQL test container with the sync schema applied
pub struct TestDatabase {
    _container: ContainerAsync<GenericImage>,
    pub config: TestDatabaseConfig,
    pub pool: PgPool,
}

impl TestDatabase {
    /// Starts a container and runs the migrations against it
    ///
    /// # Errors
    ///
    /// Returns an error if the container fails to start or the migrations fail
    pub async fn new() -> Result<Self, BoxError> {
        let container = GenericImage::new(POSTGRES_IMAGE, POSTGRES_TAG)
            .with_exposed_port(5432.tcp())
            .with_wait_for(WaitFor::message_on_stderr("database system is ready to accept connections"))
            .with_env_var("POSTGRES_USER", POSTGRES_USER)
            .with_env_var("POSTGRES_PASSWORD", POSTGRES_PASSWORD)
            .with_env_var("POSTGRES_DB", POSTGRES_DB)
            .start()
            .await?;

        let port = container.get_host_port_ipv4(5432).await?;
        let host = container.get_host().await?.to_string();

        let config = TestDatabaseConfig {
            host,
            port,
            ..TestDatabaseConfig::default()
        };

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&config.connection_url())
            .await?;

        run_migrations(&pool).await?;

        Ok(Self {
            _container: container,
            config,
            pool,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Empties every sync table, keeping the schema
    pub async fn clear_data(&self) -> Result<(), BoxError> {
        sqlx::query(&format!("TRUNCATE TABLE {} RESTART IDENTITY", REQUIRED_TABLES.join(", ")))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub fn ledger(&self) -> Arc<PgIdempotencyLedger> {
        Arc::new(PgIdempotencyLedger::new(self.pool.clone()))
    }

    pub fn rule_store(&self) -> Arc<PgMappingRuleStore> {
        Arc::new(PgMappingRuleStore::new(self.pool.clone()))
    }

    pub fn link_store(&self) -> Arc<PgEntityLinkStore> {
        Arc::new(PgEntityLinkStore::new(self.pool.clone()))
    }

    pub fn connection_store(&self) -> Arc<PgConnectionStore> {
        Arc::new(PgConnectionStore::new(self.pool.clone()))
    }
}

/// Starts a database used by one test only
pub async fn create_isolated_test_database() -> Result<TestDatabase, BoxError> {
    TestDatabase::new().await
}

/// Runs `$body` against a fresh database bound to `db`
#[macro_export]
macro_rules! db_test {
    ($name:ident, |$db:ident| $body:block) => {
        #[tokio::test]
        #[ignore = "requires Docker"]
        async fn $name() {
            let $db = $crate::database::create_isolated_test_database()
                .await
                .expect("Failed to create test database");
            $body
        }
    };
}
