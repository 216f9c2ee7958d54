//! Mapping error types

use thiserror::Error;

use core_kernel::{EntityType, PortError};

/// Errors raised while resolving rules or translating entities
#[derive(Debug, Error)]
pub enum MappingError {
    /// The rule store could not be read
    #[error("Mapping rule store error: {0}")]
    RuleStore(#[from] PortError),

    /// A canonical entity could not be converted to or from its field map
    #[error("Malformed {entity_type} entity: {message}")]
    EntityShape {
        entity_type: EntityType,
        message: String,
    },

    /// A canonical field path is empty or has empty segments
    #[error("Invalid canonical field path: '{0}'")]
    InvalidPath(String),

    /// A rule or update targets an identity field
    #[error("Field '{0}' is managed by the engine and cannot be mapped")]
    ProtectedField(String),

    /// An entity of one type was handed to an operation for another
    #[error("Expected a {expected} entity, got {actual}")]
    EntityTypeMismatch {
        expected: EntityType,
        actual: EntityType,
    },
}

impl MappingError {
    pub fn entity_shape(entity_type: EntityType, message: impl Into<String>) -> Self {
        MappingError::EntityShape {
            entity_type,
            message: message.into(),
        }
    }

    /// True for errors that mean a collaborator handed us bad data
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            MappingError::EntityShape { .. } | MappingError::EntityTypeMismatch { .. }
        )
    }
}
