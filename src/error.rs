use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{gate::DenyReason, models::ErrorBody};

/// AppError
///
/// Failures raised by handlers after the gate has admitted the request.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation",
            AppError::Store(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            // Database details stay in the logs.
            AppError::Store(e) => {
                tracing::error!("store failure: {:?}", e);
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            error: self.kind().to_string(),
            message,
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Denials become 401 when nobody is signed in and 403 otherwise.
impl IntoResponse for DenyReason {
    fn into_response(self) -> Response {
        let status = match self {
            DenyReason::Unauthenticated => StatusCode::UNAUTHORIZED,
            DenyReason::MissingRole(_) | DenyReason::MissingPermission(_) => StatusCode::FORBIDDEN,
        };
        let body = ErrorBody {
            error: self.kind().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
