//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;
use domain::DomainError;
use projections::ProjectionError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No trusted identity headers on a request that needs them.
    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Checkout(err) => checkout_status(err),
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn checkout_status(err: &CheckoutError) -> StatusCode {
    match err {
        CheckoutError::Validation(_)
        | CheckoutError::EmptyCart
        | CheckoutError::InvalidSignature(_) => StatusCode::BAD_REQUEST,
        CheckoutError::Authorization(_) => StatusCode::FORBIDDEN,
        CheckoutError::NotFound { .. } => StatusCode::NOT_FOUND,
        CheckoutError::OutOfStock { .. }
        | CheckoutError::ConcurrentStockConflict { .. }
        | CheckoutError::InvalidState(_) => StatusCode::CONFLICT,
        CheckoutError::Domain(e) if e.is_concurrency_conflict() => StatusCode::CONFLICT,
        CheckoutError::Precondition(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CheckoutError::Gateway(_) => StatusCode::BAD_GATEWAY,
        CheckoutError::CompensationFailed { .. }
        | CheckoutError::ReadModel(_)
        | CheckoutError::Domain(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Checkout(err.into())
    }
}

impl From<ProjectionError> for ApiError {
    fn from(err: ProjectionError) -> Self {
        ApiError::Checkout(err.into())
    }
}
