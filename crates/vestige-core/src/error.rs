//! Error types for vestige.

use thiserror::Error;

/// Result type alias using vestige's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for vestige operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input: empty identity, self-relationship, weight out of range.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Unknown id, expired record, or a record owned by someone else.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Storage failure not originating from sqlx.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The image collaborator could not be reached.
    #[error("Collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pub/sub broker failure
    #[error("Broker error: {0}")]
    Broker(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the failure is worth retrying at the storage boundary.
    ///
    /// Only connection-level sqlx failures qualify. Constraint violations and
    /// validation errors are deterministic and will fail again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Database(
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed
            )
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::Broker(e.to_string())
    }
}
