//! Core error types used across the system

use thiserror::Error;

/// Core error type for the kernel
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown {kind}: '{value}'")]
    UnknownTag { kind: &'static str, value: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }

    pub fn unknown_tag(kind: &'static str, value: impl Into<String>) -> Self {
        CoreError::UnknownTag {
            kind,
            value: value.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        CoreError::NotFound(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        CoreError::Configuration(message.into())
    }
}
