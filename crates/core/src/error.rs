//! Error taxonomy for the realtime core

use courier_database::DatabaseError;
use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("user {user_id} is not a member of chat {chat_id}")]
    NotAMember { chat_id: i64, user_id: i64 },

    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// The request was valid but had nothing left to do, e.g. adding a user
    /// who is already a member. Reported back to the caller, never fanned out.
    #[error("nothing to do: {0}")]
    NoOp(String),

    #[error("chat not found: {0}")]
    ChatNotFound(i64),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The durable store did not answer within the configured deadline.
    #[error("message store unavailable")]
    StoreUnavailable,

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl CoreError {
    /// Client-facing error text. Database and timeout details stay in the
    /// logs; the wire only says the store failed.
    pub fn client_message(&self) -> String {
        match self {
            CoreError::Database(_) | CoreError::StoreUnavailable => {
                "message store unavailable".to_string()
            }
            other => other.to_string(),
        }
    }
}
