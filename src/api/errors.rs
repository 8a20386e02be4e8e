//! API Error Handling
//!
//! Structured error responses with proper HTTP status codes and request tracking.

use crate::errors::Error;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

/// Error body with structured information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error code (NOT_FOUND, CONFLICT, INSUFFICIENT_FUNDS, etc.)
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

/// API error types with request tracking
#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    NotFound(String),
    BadRequest(String),
    PaymentRequired(String),
    Forbidden(String),
    Conflict(String),
    InternalError(String),
}

impl ApiError {
    pub fn not_found(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::NotFound(message),
            request_id,
        }
    }

    pub fn bad_request(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::BadRequest(message),
            request_id,
        }
    }

    pub fn internal_error(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::InternalError(message),
            request_id,
        }
    }

    /// Map a domain error onto the HTTP surface.
    pub fn from_domain(request_id: String, error: Error) -> Self {
        let kind = match &error {
            Error::Validation(_) => ApiErrorKind::BadRequest(error.to_string()),
            Error::NotFound { .. } => ApiErrorKind::NotFound(error.to_string()),
            Error::InsufficientFunds { .. } => ApiErrorKind::PaymentRequired(error.to_string()),
            Error::AlreadyFinalized(_) | Error::AlreadySettled(_) => {
                ApiErrorKind::Conflict(error.to_string())
            }
            Error::Authorization(_) => ApiErrorKind::Forbidden(error.to_string()),
            Error::Persistence(_) => ApiErrorKind::InternalError(error.to_string()),
        };
        Self { kind, request_id }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ApiErrorKind::NotFound(msg) => write!(f, "[{}] Not Found: {}", self.request_id, msg),
            ApiErrorKind::BadRequest(msg) => {
                write!(f, "[{}] Bad Request: {}", self.request_id, msg)
            }
            ApiErrorKind::PaymentRequired(msg) => {
                write!(f, "[{}] Payment Required: {}", self.request_id, msg)
            }
            ApiErrorKind::Forbidden(msg) => write!(f, "[{}] Forbidden: {}", self.request_id, msg),
            ApiErrorKind::Conflict(msg) => write!(f, "[{}] Conflict: {}", self.request_id, msg),
            ApiErrorKind::InternalError(msg) => {
                write!(f, "[{}] Internal Error: {}", self.request_id, msg)
            }
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self.kind {
            ApiErrorKind::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiErrorKind::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiErrorKind::PaymentRequired(msg) => (
                StatusCode::PAYMENT_REQUIRED,
                "INSUFFICIENT_FUNDS",
                msg.clone(),
            ),
            ApiErrorKind::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
            ApiErrorKind::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            ApiErrorKind::InternalError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        let body = Json(ErrorResponse {
            request_id: self.request_id.clone(),
            error: ErrorBody {
                code: code.to_string(),
                message,
            },
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::PointCategory;
    use uuid::Uuid;

    #[test]
    fn test_domain_error_mapping() {
        let id = || "req-1".to_string();

        let conflict = ApiError::from_domain(id(), Error::AlreadyFinalized(Uuid::new_v4()));
        assert!(matches!(conflict.kind, ApiErrorKind::Conflict(_)));

        let payment = ApiError::from_domain(
            id(),
            Error::InsufficientFunds {
                category: PointCategory::General,
                required: 10,
                available: 5,
            },
        );
        assert!(matches!(payment.kind, ApiErrorKind::PaymentRequired(_)));

        let forbidden = ApiError::from_domain(id(), Error::Authorization("denied".into()));
        assert!(matches!(forbidden.kind, ApiErrorKind::Forbidden(_)));

        let bad = ApiError::from_domain(id(), Error::validation("nope"));
        assert!(matches!(bad.kind, ApiErrorKind::BadRequest(_)));
    }
}
