use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use super::ApiResponse;
use crate::db::ListError;
use crate::services::ActivationError;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),

    ValidationError(String),

    /// Duplicate name reported by the identity service. Expected and
    /// non-fatal; surfaced to the operator as-is.
    Conflict(String),

    /// The identity service could not be reached or refused the call.
    IdentityUnavailable(String),

    DatabaseError(String),

    InternalError(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::IdentityUnavailable(msg) => write!(f, "Identity service error: {}", msg),
            ApiError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::IdentityUnavailable(msg) => {
                tracing::warn!("Identity service error: {}", msg);
                (StatusCode::BAD_GATEWAY, msg.clone())
            }
            ApiError::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A database error occurred".to_string(),
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ApiResponse::<()>::error(error_message);
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::DatabaseError(err.to_string())
    }
}

impl From<ListError> for ApiError {
    fn from(err: ListError) -> Self {
        match err {
            ListError::ProjectNotFound(name) => {
                ApiError::NotFound(format!("No project named \"{}\"", name))
            }
            ListError::Other(err) => ApiError::DatabaseError(err.to_string()),
        }
    }
}

impl From<ActivationError> for ApiError {
    fn from(err: ActivationError) -> Self {
        match err {
            ActivationError::NameConflict(name) => {
                ApiError::Conflict(format!("User name \"{}\" is already used", name))
            }
            ActivationError::DomainLookup(_) | ActivationError::CreateFailed(_) => {
                ApiError::IdentityUnavailable(err.to_string())
            }
        }
    }
}

impl From<crate::clients::keystone::IdentityError> for ApiError {
    fn from(err: crate::clients::keystone::IdentityError) -> Self {
        ApiError::IdentityUnavailable(err.to_string())
    }
}

impl ApiError {
    pub fn not_found(resource: &str, id: impl fmt::Display) -> Self {
        ApiError::NotFound(format!("{} {} not found", resource, id))
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::ValidationError(msg.into())
    }
}
