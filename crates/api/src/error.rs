//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use saga::SagaError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found.
    #[error("{0}")]
    NotFound(String),
    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),
    /// Domain service error.
    #[error(transparent)]
    Domain(DomainError),
    /// Saga error.
    #[error(transparent)]
    Saga(SagaError),
    /// Internal server error.
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Domain(err) => domain_error_to_response(&err),
            ApiError::Saga(err) => saga_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_error_to_response(err: &DomainError) -> (StatusCode, String) {
    if err.is_validation() {
        (StatusCode::BAD_REQUEST, err.to_string())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, err.to_string())
    } else {
        tracing::error!(error = %err, "domain error");
        (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    match err {
        SagaError::Domain(domain) => domain_error_to_response(&domain),
        SagaError::ProgressNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        _ => {
            tracing::error!(error = %err, "saga error");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

impl From<domain::OrderError> for ApiError {
    fn from(err: domain::OrderError) -> Self {
        ApiError::Domain(err.into())
    }
}

impl From<domain::LedgerError> for ApiError {
    fn from(err: domain::LedgerError) -> Self {
        ApiError::Domain(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::OrderId;
    use domain::{LedgerError, OrderError};
    use rust_decimal_macros::dec;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_validation_is_bad_request() {
        let err = ApiError::from(OrderError::InvalidAmount(dec!(0)));
        assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_missing_account_is_not_found() {
        let err = ApiError::from(LedgerError::AccountNotFound("Nope".to_string()));
        assert_eq!(status_of(err), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_saga_wrapped_domain_error_keeps_status() {
        let err = ApiError::from(SagaError::from(OrderError::OrderNotFound(OrderId::new())));
        assert_eq!(status_of(err), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_missing_progress_is_not_found() {
        let err = ApiError::from(SagaError::ProgressNotFound(OrderId::new()));
        assert_eq!(status_of(err), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_other_saga_errors_are_internal() {
        let err = ApiError::from(SagaError::step_failed("orchestrator", "boom"));
        assert_eq!(status_of(err), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
