//! Error types for the database layer

use thiserror::Error;

/// Result type alias for database operations
pub type DatabaseResult<T> = Result<T, DatabaseError>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("database error: {0}")]
    Query(#[from] sqlx::Error),

    #[error("chat not found: {0}")]
    ChatNotFound(i64),

    #[error("user not found: {0}")]
    UserNotFound(i64),

    #[error("message not found: {0}")]
    MessageNotFound(i64),

    #[error("invalid members: {0}")]
    InvalidMembers(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
