//! HTTP error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chatters_auth::CredentialError;
use chatters_core::{AuthError, StorageError};
use chatters_store::StoreError;
use serde_json::json;
use tracing::error;

/// Error returned by REST handlers, rendered as `{"error": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed or incomplete request.
    #[error("{0}")]
    BadRequest(String),
    /// Missing or invalid credentials.
    #[error("{0}")]
    Unauthorized(String),
    /// Authenticated but not allowed.
    #[error("{0}")]
    Forbidden(String),
    /// Unknown resource.
    #[error("{0}")]
    NotFound(String),
    /// Uniqueness violation.
    #[error("{0}")]
    Conflict(String),
    /// Anything the client cannot fix.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Wrap an unexpected failure, keeping the detail out of the response.
    pub fn internal(context: &str, detail: impl std::fmt::Display) -> Self {
        error!(error = %detail, "{context}");
        Self::Internal(context.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => Self::NotFound(format!("{what} not found")),
            StoreError::UnknownUser(user) => Self::NotFound(format!("user {user} not found")),
            StoreError::Conflict(what) => Self::Conflict(what),
            StoreError::NotMember { .. } => Self::Forbidden("not a member of this chat".into()),
            StoreError::InvalidInput(what) => Self::BadRequest(what),
            other => Self::internal("storage failure", other),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(what) => Self::NotFound(format!("{what} not found")),
            StorageError::Conflict(what) => Self::Conflict(what),
            StorageError::NotMember { .. } => Self::Forbidden("not a member of this chat".into()),
            other => Self::internal("storage failure", other),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        Self::Unauthorized(e.to_string())
    }
}

impl From<CredentialError> for ApiError {
    fn from(e: CredentialError) -> Self {
        Self::internal("credential failure", e)
    }
}
