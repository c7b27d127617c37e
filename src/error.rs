use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt::Display;
use thiserror::Error;

/// Failure kinds surfaced by the review engine.
///
/// Each variant carries a short machine-readable reason; human-facing text is
/// left to whoever renders the error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(&'static str),
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("not found: {0}")]
    NotFound(&'static str),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// The storage collaborator failed; not a business outcome.
    #[error("storage failure: {0}")]
    Storage(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn storage<E: Display>(error: E) -> Self {
        CoreError::Storage(error.to_string())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Unauthenticated(_) => "unauthenticated",
            CoreError::Forbidden(_) => "forbidden",
            CoreError::NotFound(_) => "not_found",
            CoreError::InvalidInput(_) => "invalid_input",
            CoreError::Storage(_) => "internal",
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            CoreError::Unauthenticated(reason)
            | CoreError::Forbidden(reason)
            | CoreError::NotFound(reason)
            | CoreError::InvalidInput(reason) => reason,
            CoreError::Storage(_) => "storage_failure",
        }
    }
}

impl From<diesel::result::Error> for CoreError {
    fn from(value: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};

        match value {
            Error::NotFound => CoreError::NotFound("record_not_found"),
            Error::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
                CoreError::NotFound("referenced_record_missing")
            }
            other => CoreError::storage(other),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    kind: &'static str,
    reason: String,
}

impl AppError {
    pub fn new(status: StatusCode, kind: &'static str, reason: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            reason: reason.into(),
        }
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_input", reason)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthenticated", "missing_credential")
    }

    pub fn internal<E: Display>(error: E) -> Self {
        tracing::error!(error = %error, "internal error");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "internal_error",
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<CoreError> for AppError {
    fn from(value: CoreError) -> Self {
        let status = match &value {
            CoreError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            CoreError::Storage(_) => return AppError::internal(value),
        };
        AppError::new(status, value.kind(), value.reason())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError::internal(value)
    }
}

// Extractor rejections carry parser text; only the reason code reaches the caller.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "rejected request body");
        AppError::bad_request("invalid_body")
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "rejected path parameters");
        AppError::bad_request("invalid_path")
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "rejected query string");
        AppError::bad_request("invalid_query")
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "rejected multipart request");
        AppError::bad_request("invalid_multipart")
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.kind,
            reason: self.reason,
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    reason: String,
}
