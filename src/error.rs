use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::entitlements::EntitlementError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("quota exceeded: {used}/{limit}")]
    QuotaExceeded { used: i64, limit: i64 },
}

impl From<EntitlementError> for AppError {
    fn from(err: EntitlementError) -> Self {
        match err {
            EntitlementError::InvalidFeature(feature) => {
                AppError::BadRequest(format!("unknown feature type: {feature}"))
            }
            EntitlementError::QuotaExceeded { used, limit } => {
                AppError::QuotaExceeded { used, limit }
            }
            EntitlementError::Storage(err) => AppError::Db(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::error!(?self);
        match self {
            AppError::QuotaExceeded { used, limit } => (
                status,
                Json(json!({
                    "error": "quota_exceeded",
                    "used": used,
                    "limit": limit,
                })),
            )
                .into_response(),
            // Storage details stay out of the response body.
            AppError::Db(_) => (status, "internal error".to_string()).into_response(),
            AppError::BadRequest(message) => (status, message).into_response(),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
