//! Database error types
//!
//! This module defines the error types that can occur during database operations,
//! and how they surface through the domain ports as `PortError`.

use thiserror::Error;

use core_kernel::PortError;

/// Errors that can occur during database operations
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to establish a database connection
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Entity not found in database
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// Unique constraint violation
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Check constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Migration error
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// The schema is missing tables the adapters need
    #[error("Schema incomplete, missing tables: {}", .0.join(", "))]
    SchemaIncomplete(Vec<String>),

    /// A stored value could not be turned back into a domain value
    #[error("Corrupt row in {table}: {message}")]
    CorruptRow { table: &'static str, message: String },

    /// Pool exhaustion - no available connections
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Generic SQL error
    #[error("SQL error: {0}")]
    SqlError(sqlx::Error),
}

impl DatabaseError {
    /// Creates a not found error for a specific entity type and identifier
    ///
    /// # Example
    ///
    /// ```rust
    /// use infra_db::DatabaseError;
    ///
    /// let error = DatabaseError::not_found("WebhookEvent", "hubspot:evt-1");
    /// assert!(error.to_string().contains("WebhookEvent"));
    /// ```
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        DatabaseError::NotFound(format!("{} with id '{}' not found", entity, id))
    }

    /// Creates an error for a row whose column could not be decoded
    pub fn corrupt_row(table: &'static str, message: impl std::fmt::Display) -> Self {
        DatabaseError::CorruptRow {
            table,
            message: message.to_string(),
        }
    }

    /// Checks if this error indicates a record was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound(_))
    }

    /// Checks if this error is a constraint violation
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            DatabaseError::DuplicateEntry(_) | DatabaseError::ConstraintViolation(_)
        )
    }

    /// Checks if this error is a connection-related issue
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            DatabaseError::ConnectionFailed(_) | DatabaseError::PoolExhausted
        )
    }
}

/// Maps SQLx errors onto the specific variants using the PostgreSQL error code
///
/// <https://www.postgresql.org/docs/current/errcodes-appendix.html>
impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::PoolTimedOut => DatabaseError::PoolExhausted,
            sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                DatabaseError::ConnectionFailed(error.to_string())
            }
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some("23505") => DatabaseError::DuplicateEntry(db_err.message().to_string()),
                Some("23514") => DatabaseError::ConstraintViolation(db_err.message().to_string()),
                // connection_exception class
                Some(code) if code.starts_with("08") => {
                    DatabaseError::ConnectionFailed(db_err.message().to_string())
                }
                _ => DatabaseError::QueryFailed(db_err.message().to_string()),
            },
            _ => DatabaseError::SqlError(error),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DatabaseError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        DatabaseError::MigrationFailed(error.to_string())
    }
}

/// Translation to the port error every adapter returns
///
/// Connection problems stay transient so callers can retry; constraint
/// violations become conflicts; anything else is internal.
impl From<DatabaseError> for PortError {
    fn from(error: DatabaseError) -> Self {
        match error {
            DatabaseError::ConnectionFailed(message) => PortError::Connection {
                message,
                source: None,
            },
            DatabaseError::PoolExhausted => PortError::Connection {
                message: "connection pool exhausted".to_string(),
                source: None,
            },
            DatabaseError::NotFound(message) => PortError::NotFound {
                entity_type: "record".to_string(),
                id: message,
            },
            DatabaseError::DuplicateEntry(message) | DatabaseError::ConstraintViolation(message) => {
                PortError::Conflict { message }
            }
            DatabaseError::CorruptRow { .. } => PortError::transformation(error.to_string()),
            other => PortError::Internal {
                message: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }
}
