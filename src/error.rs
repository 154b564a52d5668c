//! Top-level error type and the single place raw errors become HTTP responses.
//!
//! Internal modules return their own `thiserror` enums (`DbError`,
//! `CacheError`, `CryptoError`, ...); this module is the only place those get
//! mapped to a status code and a client-facing error kind. Handlers
//! return `Result<T, ApiError>` and propagate with `?` rather than matching
//! on error strings.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::{cache::CacheError, db::DbError, services::keys::KeyServiceError};

/// Client-facing error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    MalformedRequest,
    ProviderNotConfigured,
    Unauthorized,
    ModelNotAllowed,
    BudgetExceeded,
    Internal,
    UpstreamUnreachable,
    NotFound,
    Forbidden,
    Conflict,
    ServiceUnavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("provider not configured: {0}")]
    ProviderNotConfigured(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("model not allowed")]
    ModelNotAllowed,
    #[error("budget exceeded")]
    BudgetExceeded,
    #[error("internal error: {0}")]
    Internal(String),
    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),
    #[error("not found")]
    NotFound,
    #[error("forbidden")]
    Forbidden,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::MalformedRequest(_) => ErrorKind::MalformedRequest,
            ApiError::ProviderNotConfigured(_) => ErrorKind::ProviderNotConfigured,
            ApiError::Unauthorized => ErrorKind::Unauthorized,
            ApiError::ModelNotAllowed => ErrorKind::ModelNotAllowed,
            ApiError::BudgetExceeded => ErrorKind::BudgetExceeded,
            ApiError::Internal(_) => ErrorKind::Internal,
            ApiError::UpstreamUnreachable(_) => ErrorKind::UpstreamUnreachable,
            ApiError::NotFound => ErrorKind::NotFound,
            ApiError::Forbidden => ErrorKind::Forbidden,
            ApiError::Conflict(_) => ErrorKind::Conflict,
            ApiError::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ProviderNotConfigured(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::ModelNotAllowed => StatusCode::FORBIDDEN,
            ApiError::BudgetExceeded => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorKind,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// DB failures propagate as 500s; `NotFound` and `Conflict` are the only
/// variants callers are expected to handle specially before this conversion.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound => ApiError::NotFound,
            DbError::Conflict(msg) => ApiError::Conflict(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// Cache failures must never surface to the client; this conversion
/// exists only for call sites that choose to bubble a cache error up after
/// already deciding it's unrecoverable (e.g. during startup).
impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<KeyServiceError> for ApiError {
    fn from(err: KeyServiceError) -> Self {
        match err {
            KeyServiceError::Invalid | KeyServiceError::Revoked => ApiError::Unauthorized,
            KeyServiceError::ProviderNotConfigured => {
                ApiError::ProviderNotConfigured("requested provider has no credential".into())
            }
            KeyServiceError::BudgetExceeded => ApiError::BudgetExceeded,
            KeyServiceError::Unauthorized => ApiError::Forbidden,
            KeyServiceError::Db(e) => e.into(),
            KeyServiceError::Crypto(e) => ApiError::Internal(e.to_string()),
        }
    }
}
