//! Test Utilities Crate
//!
//! Shared test infrastructure for the CRM sync test suite.
//!
//! # Modules
//!
//! - `fixtures`: Fixed tenants, timestamps, connections and webhook fields
//! - `builders`: Builders for canonical entities and inbound webhooks
//! - `harness`: A wired sync engine over the in-memory ports
//! - `database`: PostgreSQL test containers and the `infra_db` adapters
//! - `assertions`: Assertions over sync reports
//! - `generators`: Property-based test data generators

pub mod assertions;
pub mod builders;
pub mod database;
pub mod fixtures;
pub mod generators;
pub mod harness;

pub use assertions::*;
pub use builders::*;
pub use database::*;
pub use fixtures::*;
pub use generators::*;
pub use harness::SyncTestEnv;
