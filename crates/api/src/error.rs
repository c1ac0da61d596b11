//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Resource not found.
    NotFound(String),
    /// The resource's state changed under the caller.
    Conflict(String),
    /// The payment has not been confirmed by the processor.
    PaymentRequired(String),
    /// The upstream payment processor failed.
    BadGateway(String),
    /// Internal server error. The detail is logged, never returned.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::PaymentRequired(msg) => (StatusCode::PAYMENT_REQUIRED, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        match &err {
            CheckoutError::Validation(_) => ApiError::BadRequest(err.to_string()),
            CheckoutError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            CheckoutError::CartConsumed(_)
            | CheckoutError::InsufficientStock { .. }
            | CheckoutError::ProductMissing(_)
            | CheckoutError::InvalidState(_)
            | CheckoutError::AlreadyDelivered(_) => ApiError::Conflict(err.to_string()),
            CheckoutError::PaymentNotConfirmed(_) => ApiError::PaymentRequired(err.to_string()),
            CheckoutError::Gateway(_) => ApiError::BadGateway(err.to_string()),
            CheckoutError::Transaction(source) => {
                ApiError::Internal(format!("{err}: {source}"))
            }
        }
    }
}
