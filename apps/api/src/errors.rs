use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::policy::error::PolicyError;
use crate::store::StoreError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    /// A page with nothing readable; `next_cursor` lets the client skip it.
    #[error("Unreadable page: {message}")]
    UnreadablePage {
        message: String,
        next_cursor: Option<String>,
    },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<PolicyError> for AppError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::Validation(problems) => AppError::Validation(problems.join("; ")),
            PolicyError::InvalidCursor(reason) => AppError::InvalidCursor(reason),
            PolicyError::NotFound(id) => AppError::NotFound(format!("Policy {id} not found")),
            e @ PolicyError::MalformedRecord { .. } => AppError::UnprocessableEntity(e.to_string()),
            PolicyError::PageUnreadable {
                skipped,
                next_cursor,
            } => AppError::UnreadablePage {
                message: format!("every record in the page was malformed ({skipped} skipped)"),
                next_cursor: next_cursor.map(|c| c.encode()),
            },
            PolicyError::Store(StoreError::NotFound { collection, id }) => {
                AppError::NotFound(format!("Document {collection}/{id} not found"))
            }
            PolicyError::Store(StoreError::Unavailable(reason)) => AppError::StoreUnavailable(reason),
            PolicyError::Store(e) => AppError::Internal(e.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::InvalidCursor(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_CURSOR", msg.clone())
            }
            AppError::UnprocessableEntity(msg) => {
                tracing::warn!("Unreadable policy data: {msg}");
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "UNPROCESSABLE_ENTITY",
                    msg.clone(),
                )
            }
            AppError::UnreadablePage { message, .. } => {
                tracing::warn!("Unreadable policy page: {message}");
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "UNPROCESSABLE_ENTITY",
                    message.clone(),
                )
            }
            AppError::StoreUnavailable(msg) => {
                tracing::error!("Store unavailable: {msg}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "STORE_UNAVAILABLE",
                    "The policy store is temporarily unavailable".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let mut error = json!({
            "code": code,
            "message": message
        });
        if let AppError::UnreadablePage {
            next_cursor: Some(cursor),
            ..
        } = &self
        {
            error["nextCursor"] = json!(cursor);
        }
        let body = Json(json!({ "error": error }));

        (status, body).into_response()
    }
}
