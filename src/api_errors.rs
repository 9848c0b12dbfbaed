use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::errors::TrustError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{message}")]
    Unavailable { message: String, status: StatusCode },
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    fn retryable(&self) -> bool {
        matches!(self, AppError::Unavailable { .. })
    }
}

#[derive(Serialize)]
struct ErrBody {
    error: String,
    retryable: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let retryable = self.retryable();
        let (code, msg) = match &self {
            AppError::BadRequest(s) => (StatusCode::BAD_REQUEST, s),
            AppError::NotFound(s) => (StatusCode::NOT_FOUND, s),
            AppError::Conflict(s) => (StatusCode::CONFLICT, s),
            AppError::Unavailable { message, status } => (*status, message),
            AppError::Internal(s) => (StatusCode::INTERNAL_SERVER_ERROR, s),
        };
        (
            code,
            Json(ErrBody {
                error: msg.clone(),
                retryable,
            }),
        )
            .into_response()
    }
}

impl From<TrustError> for AppError {
    fn from(err: TrustError) -> Self {
        let status = err.status_code();
        if err.is_retryable() {
            // Backend details stay in the logs; clients get one opaque failure.
            tracing::warn!(error = %err, "retryable evaluation failure");
            return AppError::Unavailable {
                message: "evaluation temporarily unavailable, please resubmit".to_string(),
                status,
            };
        }
        match err {
            TrustError::Validation { field, message } => {
                AppError::BadRequest(format!("Validation error for {field}: {message}"))
            }
            TrustError::AgentNotFound { id } => {
                AppError::NotFound(format!("Agent '{id}' not found"))
            }
            TrustError::Conflict { message } => AppError::Conflict(message),
            e @ TrustError::InvalidTransition { .. } => AppError::Conflict(e.to_string()),
            other => {
                tracing::error!(error = %other, "request failed");
                AppError::Internal("evaluation failed".to_string())
            }
        }
    }
}
