//--------------------------------------------------------------------------------------------------
// ENUMS
//--------------------------------------------------------------------------------------------------
// | Name            | Description                                      | Key Methods         |
// |-----------------|--------------------------------------------------|---------------------|
// | ApiError        | Error types for the API                          | from                |
//--------------------------------------------------------------------------------------------------

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::settlement::PlaceBidError;
use crate::storage::StorageError;

/// Type alias for Result with ApiError
pub type ApiResult<T> = Result<T, ApiError>;

/// API-specific error types
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    /// The requested resource was not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The request was invalid
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The caller is not authenticated
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The payment gateway refused to reserve funds
    #[error("Payment reserve failed: {reason}")]
    PaymentRequired { reason: String },

    /// Internal server error
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // The 402 body keeps a flat shape the bidding frontend matches on.
        if let Self::PaymentRequired { reason } = self {
            let body = Json(json!({
                "error": "payment_reserve_failed",
                "reason": reason,
            }));
            return (StatusCode::PAYMENT_REQUIRED, body).into_response();
        }

        let (status, error_message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            Self::PaymentRequired { .. } => unreachable!(),
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "code": status.as_u16()
            }
        }));

        (status, body).into_response()
    }
}

impl From<PlaceBidError> for ApiError {
    fn from(err: PlaceBidError) -> Self {
        match err {
            PlaceBidError::Validation(msg) => Self::BadRequest(msg),
            PlaceBidError::PaymentReserveFailed { reason } => Self::PaymentRequired { reason },
            PlaceBidError::Storage(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(entity, id) => Self::NotFound(format!("{} {} not found", entity, id)),
            other => Self::Internal(other.to_string()),
        }
    }
}
