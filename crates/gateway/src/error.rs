//! Error types for the gateway layer

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use courier_auth::AuthError;
use courier_core::CoreError;
use serde_json::json;
use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("service unavailable")]
    ServiceUnavailable,

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
            GatewayError::AccessDenied(_) => StatusCode::FORBIDDEN,
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": status.as_str(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<CoreError> for GatewayError {
    fn from(error: CoreError) -> Self {
        match &error {
            CoreError::AuthenticationFailed => {
                GatewayError::AuthenticationFailed(error.to_string())
            }
            CoreError::NotAMember { .. } | CoreError::NotAuthorized(_) => {
                GatewayError::AccessDenied(error.client_message())
            }
            CoreError::NoOp(_) | CoreError::InvalidInput(_) => {
                GatewayError::InvalidRequest(error.client_message())
            }
            CoreError::ChatNotFound(_) => GatewayError::NotFound(error.to_string()),
            CoreError::StoreUnavailable => GatewayError::ServiceUnavailable,
            CoreError::Database(_) => GatewayError::Internal(error.client_message()),
        }
    }
}

impl From<AuthError> for GatewayError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Database(err) => GatewayError::Internal(err.to_string()),
            other => GatewayError::AuthenticationFailed(other.to_string()),
        }
    }
}

impl From<courier_database::DatabaseError> for GatewayError {
    fn from(error: courier_database::DatabaseError) -> Self {
        GatewayError::Internal(error.to_string())
    }
}
