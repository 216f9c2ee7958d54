//! Core Kernel - Foundational types shared by every CRM sync crate
//!
//! This crate provides the building blocks used across the sync engine:
//! - Strongly-typed identifiers for tenants, entities and events
//! - CRM system and entity type tags
//! - Port abstractions (errors, health checks) for the hexagonal layout
//! - Health aggregation across registered adapters

pub mod crm;
pub mod error;
pub mod identifiers;
pub mod ports;
pub mod registry;

pub use crm::{CrmSystem, EntityType};
pub use error::CoreError;
pub use identifiers::{EntityId, EventId, TenantId};
pub use ports::{
    AdapterHealth, CircuitBreakerConfig, DomainPort, HealthCheckResult, HealthCheckable,
    OperationMetadata, PortError,
};
pub use registry::RegistryHealthReport;
