//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the CRM sync engine using SQLx.
//!
//! # Architecture
//!
//! The crate follows the repository pattern: `repositories` hold the SQL and
//! speak in rows, `adapters` implement the domain ports on top of them.
//!
//! | Port                 | Adapter                | Table                 |
//! |----------------------|------------------------|-----------------------|
//! | `IdempotencyLedger`  | `PgIdempotencyLedger`  | `crm_webhook_events`  |
//! | `MappingRuleStore`   | `PgMappingRuleStore`   | `crm_field_mappings`  |
//! | `EntityLinkStore`    | `PgEntityLinkStore`    | `crm_entity_links`    |
//! | `ConnectionStore`    | `PgConnectionStore`    | `crm_connections`     |
//!
//! The canonical entity repository belongs to the host application and is
//! not provided here.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PgIdempotencyLedger};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/crm_sync")).await?;
//! run_migrations(&pool).await?;
//! let ledger = PgIdempotencyLedger::new(pool.clone());
//! ```

pub mod adapters;
pub mod error;
pub mod pool;
pub mod repositories;

pub use adapters::{PgConnectionStore, PgEntityLinkStore, PgIdempotencyLedger, PgMappingRuleStore};
pub use error::DatabaseError;
pub use pool::{
    create_pool, create_pool_from_url, run_migrations, verify_schema, DatabaseConfig, DatabasePool,
    REQUIRED_TABLES,
};
