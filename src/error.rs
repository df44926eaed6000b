use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::lifecycle::CodeError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Code is already closed")]
    AlreadyClosed,

    #[error("Specimen number already exists")]
    DuplicateSpecimen,

    #[error("Storage error: {0}")]
    Store(StoreError),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl From<CodeError> for AppError {
    fn from(err: CodeError) -> Self {
        match err {
            CodeError::NotFound => AppError::NotFound("code not found".to_string()),
            CodeError::AlreadyClosed => AppError::AlreadyClosed,
            CodeError::DuplicateSpecimen => AppError::DuplicateSpecimen,
            CodeError::Random(e) => AppError::Internal(e.into()),
            CodeError::Store(e) => AppError::Store(e),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::NotFound("code not found".to_string()),
            other => AppError::Store(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            // Closed-state and specimen conflicts surface as 400 to match
            // the management console's contract.
            AppError::AlreadyClosed => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::DuplicateSpecimen => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Store(e) => {
                tracing::error!(error = %e, "storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Storage error".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "message": error_message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
