//! Event handler error types

use thiserror::Error;

/// Error returned by an event handler
///
/// The bus never propagates these to the publisher; each one is logged and
/// collected into the `PublishReport` for the event.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler ran and reported a failure
    #[error("{message}")]
    Failed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The handler panicked while processing the event
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Creates a failure with a message only
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps an underlying error
    pub fn from_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        HandlerError::Failed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, HandlerError::Panicked(_))
    }
}
