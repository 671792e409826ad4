//! API error types with HTTP response mapping.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use purchase::PurchaseError;
use store::StoreError;

const INTERNAL_MESSAGE: &str = "internal server error";

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found, or not visible to the caller.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Missing, malformed or expired bearer token.
    Unauthorized,
    /// Authenticated but not allowed.
    Forbidden(String),
    /// Purchase workflow error.
    Purchase(PurchaseError),
    /// Persistence error.
    Store(StoreError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Purchase(err) => purchase_error_to_response(err),
            ApiError::Store(err) => store_error_to_response(err),
            ApiError::Internal(msg) => internal(&msg),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

/// Logs the detail and hides it from the client.
fn internal(detail: &dyn std::fmt::Display) -> (StatusCode, String) {
    tracing::error!(error = %detail, "internal server error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        INTERNAL_MESSAGE.to_string(),
    )
}

fn purchase_error_to_response(err: PurchaseError) -> (StatusCode, String) {
    match &err {
        PurchaseError::SelfPurchaseForbidden => (StatusCode::FORBIDDEN, err.to_string()),
        PurchaseError::ListingUnavailable(_) => (StatusCode::CONFLICT, err.to_string()),
        PurchaseError::PaymentInitiationFailed { source, .. } => {
            tracing::warn!(error = %source, "payment initiation failed");
            (
                StatusCode::FAILED_DEPENDENCY,
                "failed to initiate payment, please try again".to_string(),
            )
        }
        PurchaseError::Domain(DomainError::InvalidAmount { .. }) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        PurchaseError::StoreUnavailable(_)
        | PurchaseError::Domain(_)
        | PurchaseError::Internal(_) => internal(&err),
    }
}

fn store_error_to_response(err: StoreError) -> (StatusCode, String) {
    match &err {
        StoreError::ListingNotFound(_) | StoreError::TransactionNotFound(_) => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        StoreError::DuplicateListing(_) | StoreError::DuplicateTransaction { .. } => {
            (StatusCode::CONFLICT, err.to_string())
        }
        _ => internal(&err),
    }
}

impl From<PurchaseError> for ApiError {
    fn from(err: PurchaseError) -> Self {
        ApiError::Purchase(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
