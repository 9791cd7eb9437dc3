//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Message shown to callers for failures whose details stay server-side.
pub const GENERIC_ERROR_MESSAGE: &str = "An internal error occurred, please try again later";

/// Application-wide error type.
///
/// This enum represents all possible errors that can occur in the application.
/// Each variant maps to a specific HTTP status code and error message.
///
/// # Error Categories
///
/// - **Pre-charge rejections**: `Validation`, `ServiceUnavailable`, `InsufficientFunds`.
///   Nothing has been written when these are returned.
/// - **Post-charge failures**: `ProviderRejected`, `ProviderTimeout`, `Unexpected`.
///   The wallet has been refunded (or handed to recovery) before these reach the caller.
/// - **Infrastructure**: `Database`, `InvalidApiKey`, `TransactionNotFound`, `DuplicateRequest`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    ///
    /// This wraps any sqlx::Error using the `#[from]` attribute, which
    /// automatically implements `From<sqlx::Error> for AppError`.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// API key is missing, invalid, or inactive.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// Requested transaction does not exist or belongs to another user.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Transaction not found")]
    TransactionNotFound,

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    /// The String contains details about what was invalid.
    #[error("{0}")]
    Validation(String),

    /// Service is missing, inactive, or lacks a provider product code or price.
    ///
    /// Returns HTTP 503 Service Unavailable.
    #[error("{0}")]
    ServiceUnavailable(String),

    /// Wallet balance is below the price of the vend.
    ///
    /// Returns HTTP 422 Unprocessable Entity.
    #[error("Insufficient funds")]
    InsufficientFunds,

    /// The idempotency key was already used by an attempt that is not replayable.
    ///
    /// Returns HTTP 409 Conflict.
    #[error("{0}")]
    DuplicateRequest(String),

    /// The provider explicitly declined the vend. The String is the provider's message.
    ///
    /// Returns HTTP 502 Bad Gateway.
    #[error("{0}")]
    ProviderRejected(String),

    /// The provider did not answer within the bounded wait.
    ///
    /// Returns HTTP 504 Gateway Timeout.
    #[error("Service timed out, please retry")]
    ProviderTimeout,

    /// Anything else that went wrong after the wallet was charged.
    ///
    /// The String is diagnostic detail for logs only; callers see a generic message.
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Convert AppError into an HTTP response.
///
/// This implementation allows Axum handlers to return `Result<T, AppError>`
/// and have errors automatically converted to proper HTTP responses.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// # Status Code Mapping
///
/// - `Validation` → 400 Bad Request
/// - `InvalidApiKey` → 401 Unauthorized
/// - `TransactionNotFound` → 404 Not Found
/// - `DuplicateRequest` → 409 Conflict
/// - `InsufficientFunds` → 422 Unprocessable Entity
/// - `ProviderRejected` → 502 Bad Gateway
/// - `ServiceUnavailable` → 503 Service Unavailable
/// - `ProviderTimeout` → 504 Gateway Timeout
/// - `Database`, `Unexpected` → 500 Internal Server Error (hides details from client)
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Validation(ref msg) => {
                (StatusCode::BAD_REQUEST, "validation_error", msg.clone())
            }
            AppError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "invalid_api_key",
                self.to_string(),
            ),
            AppError::TransactionNotFound => (
                StatusCode::NOT_FOUND,
                "transaction_not_found",
                self.to_string(),
            ),
            AppError::DuplicateRequest(ref msg) => {
                (StatusCode::CONFLICT, "duplicate_request", msg.clone())
            }
            AppError::InsufficientFunds => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "insufficient_funds",
                self.to_string(),
            ),
            AppError::ProviderRejected(ref msg) => {
                (StatusCode::BAD_GATEWAY, "provider_rejected", msg.clone())
            }
            AppError::ServiceUnavailable(ref msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                msg.clone(),
            ),
            AppError::ProviderTimeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "provider_timeout",
                self.to_string(),
            ),
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    GENERIC_ERROR_MESSAGE.to_string(),
                )
            }
            AppError::Unexpected(ref detail) => {
                tracing::error!("Unexpected error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    GENERIC_ERROR_MESSAGE.to_string(),
                )
            }
        };

        // Build JSON response body
        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
