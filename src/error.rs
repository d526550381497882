use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::storage::StorageError;

/// ApiError
///
/// Every component raises one of these; the boundary maps each variant to a status
/// code and a JSON body. `NotFound` is deliberately used both for absent rows and
/// for reads denied on private maps.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication required")]
    AuthenticationRequired,
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::StorageUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Client-facing message. Server-side failures only carry their detail in debug builds.
    fn public_message(&self) -> String {
        if cfg!(debug_assertions) {
            return self.to_string();
        }
        match self {
            Self::StorageUnavailable(_) => "Storage service unavailable".to_string(),
            Self::Internal(_) => "Something went wrong".to_string(),
            other => other.to_string(),
        }
    }
}

/// ErrorBody
///
/// JSON body returned for every failed request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: String,
    /// Human-readable message.
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            Self::StorageUnavailable(detail) => {
                tracing::error!(error = %detail, "Object storage call failed");
            }
            Self::Internal(detail) => {
                tracing::error!(error = %detail, "Internal server error");
            }
            _ => {}
        }

        let body = ErrorBody {
            error: self.code().to_string(),
            message: self.public_message(),
        };

        (self.status(), Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                let constraint = db.constraint().unwrap_or_default();
                if constraint.contains("slug") {
                    Self::conflict("A map with this slug already exists")
                } else if constraint.contains("email") {
                    Self::conflict("This email is already in use")
                } else {
                    Self::conflict("Duplicate value")
                }
            }
            _ => Self::Internal(err.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_keeps_auth_and_forbidden_distinct() {
        assert_eq!(ApiError::AuthenticationRequired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::validation("bad role").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::conflict("dup").status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::StorageUnavailable("down".into()).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn validation_message_is_passed_through() {
        let err = ApiError::validation("Unknown asset role 'foo'");
        assert_eq!(err.public_message(), "Unknown asset role 'foo'");
    }
}
