//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::posting::PostingError;
use crate::projection::ProjectionError;
use crate::store::StoreError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Settlement quote not found or expired: {0}")]
    QuoteNotFound(Uuid),

    #[error("Another settlement for unit {unit} is in progress")]
    ConcurrentSettlement { unit: String },

    #[error("Settlement conflict: {0}")]
    SettlementConflict(String),

    #[error("Settlement cancelled by operator")]
    SettlementCancelled,

    // Domain errors
    #[error(transparent)]
    Domain(#[from] crate::domain::DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    // Server errors (5xx)
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl AppError {
    /// Whether the same request may succeed when retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::ConcurrentSettlement { .. } | AppError::SettlementConflict(_)
        )
    }
}

impl From<PostingError> for AppError {
    fn from(err: PostingError) -> Self {
        match err {
            PostingError::Domain(e) => AppError::Domain(e),
            PostingError::Store(e) => AppError::Store(e),
        }
    }
}

impl From<ProjectionError> for AppError {
    fn from(err: ProjectionError) -> Self {
        match err {
            ProjectionError::Store(e) => AppError::Store(e),
            ProjectionError::InvalidQuery(msg) => AppError::InvalidRequest(msg),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }
            AppError::SettlementCancelled => {
                (StatusCode::BAD_REQUEST, "settlement_cancelled", None)
            }

            // 404 Not Found
            AppError::NotFound(what) => {
                (StatusCode::NOT_FOUND, "not_found", Some(what.clone()))
            }
            AppError::QuoteNotFound(id) => {
                (StatusCode::NOT_FOUND, "quote_not_found", Some(id.to_string()))
            }

            // 409 Conflict
            AppError::ConcurrentSettlement { unit } => {
                (StatusCode::CONFLICT, "concurrent_settlement", Some(unit.clone()))
            }
            AppError::SettlementConflict(msg) => {
                (StatusCode::CONFLICT, "settlement_conflict", Some(msg.clone()))
            }

            // Domain errors - map to appropriate HTTP status
            AppError::Domain(ref domain_err) => {
                use crate::domain::DomainError;
                match domain_err {
                    DomainError::InsufficientBalance { .. } => {
                        (StatusCode::BAD_REQUEST, "insufficient_balance", Some(domain_err.to_string()))
                    }
                    DomainError::Validation(msg) => {
                        (StatusCode::BAD_REQUEST, "validation_error", Some(msg.clone()))
                    }
                    DomainError::InvalidAmount(msg) => {
                        (StatusCode::BAD_REQUEST, "invalid_amount", Some(msg.clone()))
                    }
                    DomainError::InvalidStatusTransition { .. } => {
                        (StatusCode::BAD_REQUEST, "invalid_status_transition", Some(domain_err.to_string()))
                    }
                    DomainError::SettledRowImmutable(id) => {
                        (StatusCode::BAD_REQUEST, "settled_row_immutable", Some(id.to_string()))
                    }
                    DomainError::SettlementCapExceeded { .. } => {
                        (StatusCode::BAD_REQUEST, "settlement_cap_exceeded", Some(domain_err.to_string()))
                    }
                    DomainError::VersionConflict { expected, found } => {
                        (StatusCode::CONFLICT, "version_conflict", Some(format!("expected {}, found {}", expected, found)))
                    }
                }
            }

            // Store errors
            AppError::Store(ref store_err) => match store_err {
                StoreError::ConcurrencyConflict { expected, actual, .. } => {
                    (StatusCode::CONFLICT, "version_conflict", Some(format!("expected {}, found {}", expected, actual)))
                }
                StoreError::NotSettleable { .. } | StoreError::AmountMismatch { .. } => {
                    (StatusCode::CONFLICT, "settlement_conflict", Some(store_err.to_string()))
                }
                StoreError::DuplicatePosting(id) => {
                    (StatusCode::CONFLICT, "duplicate_posting", Some(id.to_string()))
                }
                StoreError::Immutable(id) => {
                    (StatusCode::BAD_REQUEST, "settled_row_immutable", Some(id.to_string()))
                }
                StoreError::NotFound(id) => {
                    (StatusCode::NOT_FOUND, "not_found", Some(id.to_string()))
                }
                StoreError::Database(e) => {
                    tracing::error!("Database error: {:?}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
                }
                StoreError::Serialization(_) | StoreError::Corrupt(_) => {
                    tracing::error!("Store error: {}", store_err);
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
                }
            },

            // 500 Internal Server Error
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
