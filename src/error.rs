use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::db::StoreError;

/// Every failure a handler can surface. Status codes are chosen here and
/// nowhere else.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("Email is already in use")]
    EmailAlreadyInUse,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::EmailAlreadyInUse => "EMAIL_ALREADY_IN_USE",
            AppError::InvalidCredentials => "INVALID_CREDENTIALS",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Internal(_) => "INTERNAL_FAILURE",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) | AppError::EmailAlreadyInUse => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        AppError::InvalidInput(msg.into())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        error!(error = %e, "store failed");
        match e {
            StoreError::Backend(inner) => AppError::Internal(inner),
            StoreError::UniqueViolation => {
                AppError::Internal(anyhow::anyhow!("unexpected unique violation"))
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            AppError::Internal(e) => {
                error!(error = ?e, "internal failure");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorBody {
            error: self.kind(),
            message,
        };
        (self.status(), Json(body)).into_response()
    }
}
