//! Ports and Adapters Infrastructure
//!
//! This module provides the foundational types for the hexagonal layout of the
//! sync engine. Every external collaborator the engine talks to (entity
//! storage, connection credentials, the link table, the idempotency ledger,
//! each CRM backend) is reached through a port trait defined in a domain
//! crate and extending the marker traits here.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Sync Orchestrator                       │
//! │             (outbound fan-out / inbound webhooks)            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Port Traits                           │
//! │  (CrmClient, EntityRepository, IdempotencyLedger, etc.)      │
//! │       Defined in each domain, depend only on core_kernel     │
//! └─────────────────────────────────────────────────────────────┘
//!                    ▲                         ▲
//!                    │                         │
//!         ┌─────────┴─────────┐     ┌────────┴────────┐
//!         │  Internal Adapter │     │ External Adapter │
//!         │   (PostgreSQL)    │     │  (CRM REST APIs) │
//!         └───────────────────┘     └──────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! // In domain_sync/src/idempotency.rs
//! #[async_trait]
//! pub trait IdempotencyLedger: DomainPort {
//!     async fn insert_if_absent(&self, crm: CrmSystem, id: &str, ..) -> Result<bool, PortError>;
//! }
//!
//! // In infra_db - internal adapter
//! impl IdempotencyLedger for PgIdempotencyLedger { ... }
//! ```

use std::fmt;
use thiserror::Error;
use serde::{Deserialize, Serialize};

/// Error type for port operations
///
/// Provides a unified error type that all port implementations must use,
/// ensuring consistent error handling across internal and external adapters.
#[derive(Debug, Error)]
pub enum PortError {
    /// The requested entity was not found
    #[error("Not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: String,
        id: String,
    },

    /// A validation error occurred
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// The operation conflicts with existing data
    #[error("Conflict: {message}")]
    Conflict {
        message: String,
    },

    /// Connection to the underlying system failed
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The operation timed out
    #[error("Timeout after {duration_ms}ms: {operation}")]
    Timeout {
        operation: String,
        duration_ms: u64,
    },

    /// Authentication or authorization failed
    #[error("Unauthorized: {message}")]
    Unauthorized {
        message: String,
    },

    /// Rate limit exceeded for external API
    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited {
        retry_after_secs: u64,
    },

    /// The external system is unavailable
    #[error("Service unavailable: {service}")]
    ServiceUnavailable {
        service: String,
    },

    /// A data transformation error occurred
    #[error("Transformation error: {message}")]
    Transformation {
        message: String,
    },

    /// An internal error occurred
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl PortError {
    /// Creates a NotFound error
    pub fn not_found(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    /// Creates a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        PortError::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Creates a Validation error with field information
    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        PortError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a Connection error
    pub fn connection(message: impl Into<String>) -> Self {
        PortError::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a Timeout error
    pub fn timeout(operation: impl Into<String>, duration_ms: u64) -> Self {
        PortError::Timeout {
            operation: operation.into(),
            duration_ms,
        }
    }

    /// Creates a Transformation error
    pub fn transformation(message: impl Into<String>) -> Self {
        PortError::Transformation {
            message: message.into(),
        }
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        PortError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Short machine-readable code, used when the error is folded into a sync result
    pub fn code(&self) -> &'static str {
        match self {
            PortError::NotFound { .. } => "not_found",
            PortError::Validation { .. } => "validation",
            PortError::Conflict { .. } => "conflict",
            PortError::Connection { .. } => "connection",
            PortError::Timeout { .. } => "timeout",
            PortError::Unauthorized { .. } => "unauthorized",
            PortError::RateLimited { .. } => "rate_limited",
            PortError::ServiceUnavailable { .. } => "service_unavailable",
            PortError::Transformation { .. } => "transformation",
            PortError::Internal { .. } => "internal",
        }
    }

    /// Returns true if this error indicates a transient failure that may succeed on retry
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PortError::Connection { .. }
                | PortError::Timeout { .. }
                | PortError::RateLimited { .. }
                | PortError::ServiceUnavailable { .. }
        )
    }

    /// Returns true if this error indicates the entity was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound { .. })
    }
}

/// Marker trait for all domain ports
///
/// All port traits should extend this marker to ensure they are
/// thread-safe and can be used in async contexts.
pub trait DomainPort: Send + Sync + 'static {}

/// Circuit breaker configuration for external adapters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of failures before opening the circuit
    pub failure_threshold: u32,
    /// Duration in seconds the circuit stays open before half-opening
    pub reset_timeout_secs: u64,
    /// Number of successful calls needed to close the circuit from half-open
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_secs: 30,
            success_threshold: 3,
        }
    }
}

/// Health status for an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterHealth {
    /// Adapter is healthy and operational
    Healthy,
    /// Adapter is degraded but operational
    Degraded,
    /// Adapter is unhealthy and not operational
    Unhealthy,
    /// Health status is unknown
    Unknown,
}

/// Health check result for an adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// Adapter identifier
    pub adapter_id: String,
    /// Current health status
    pub status: AdapterHealth,
    /// Latency of the health check in milliseconds
    pub latency_ms: u64,
    /// Optional message with additional details
    pub message: Option<String>,
    /// Timestamp of the health check
    pub checked_at: chrono::DateTime<chrono::Utc>,
}

impl HealthCheckResult {
    /// A healthy result with no message
    pub fn healthy(adapter_id: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            adapter_id: adapter_id.into(),
            status: AdapterHealth::Healthy,
            latency_ms,
            message: None,
            checked_at: chrono::Utc::now(),
        }
    }

    /// A result with an explicit status and explanation
    pub fn with_status(
        adapter_id: impl Into<String>,
        status: AdapterHealth,
        latency_ms: u64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            adapter_id: adapter_id.into(),
            status,
            latency_ms,
            message: Some(message.into()),
            checked_at: chrono::Utc::now(),
        }
    }
}

/// Trait for adapters that support health checks
#[async_trait::async_trait]
pub trait HealthCheckable: Send + Sync {
    /// Performs a health check on the adapter
    ///
    /// # Returns
    ///
    /// A `HealthCheckResult` indicating the current health status
    async fn health_check(&self) -> HealthCheckResult;
}

/// Metadata about a port operation for tracing across systems
#[derive(Debug, Clone, Default)]
pub struct OperationMetadata {
    /// Correlation ID for tracing across systems
    pub correlation_id: Option<String>,
    /// Source system identifier
    pub source_system: Option<String>,
    /// Additional context as key-value pairs
    pub context: std::collections::HashMap<String, String>,
}

impl OperationMetadata {
    /// Creates new metadata with a correlation ID
    pub fn with_correlation_id(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
            ..Default::default()
        }
    }

    /// Records the system the operation originated from
    pub fn from_source(mut self, source: impl Into<String>) -> Self {
        self.source_system = Some(source.into());
        self
    }

    /// Adds context to the metadata
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}
