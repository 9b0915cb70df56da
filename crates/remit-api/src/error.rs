//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps engine, state and validation errors to HTTP status codes with a JSON
//! body of the form `{"error": {"code", "message", "details?"}}`.
//! Internal error details are logged, never returned.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use remit_engine::{EngineError, StoreError};
use remit_state::RemittanceError;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "NO_LINKED_ACCOUNT").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details, present only for client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Conflict with current resource state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// ACH initiation without a linked funding account (409).
    #[error("{0}")]
    NoLinkedAccount(String),

    /// An upstream rail failed or timed out (502).
    #[error("upstream unavailable: {0}")]
    BadGateway(String),

    /// A required integration is not configured (503).
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::NoLinkedAccount(_) => (StatusCode::CONFLICT, "NO_LINKED_ACCOUNT"),
            Self::BadGateway(_) => (StatusCode::BAD_GATEWAY, "GATEWAY_UNAVAILABLE"),
            Self::ServiceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
            }
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        if matches!(&self, Self::Internal(_)) {
            tracing::error!(error = %self, "internal server error");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<remit_core::ValidationError> for AppError {
    fn from(err: remit_core::ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<RemittanceError> for AppError {
    fn from(err: RemittanceError) -> Self {
        match err {
            RemittanceError::InvalidCorrection(_) => Self::Validation(err.to_string()),
            RemittanceError::AlreadyProcessed
            | RemittanceError::InvalidTransition { .. }
            | RemittanceError::TerminalState { .. } => Self::Conflict(err.to_string()),
        }
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound { .. } => Self::NotFound(err.to_string()),
            EngineError::AlreadyProcessed(_)
            | EngineError::PaymentInFlight(_)
            | EngineError::NothingToRemit(_) => Self::Conflict(err.to_string()),
            EngineError::NoLinkedAccount(_) => Self::NoLinkedAccount(err.to_string()),
            EngineError::InvalidBankDetails(_)
            | EngineError::PaymentRejected(_)
            | EngineError::Validation(_) => Self::Validation(err.to_string()),
            EngineError::GatewayUnavailable(_) => Self::BadGateway(err.to_string()),
            EngineError::Transition(inner) => inner.into(),
            EngineError::Store(StoreError::Conflict(msg)) => Self::Conflict(msg),
            EngineError::Store(_) | EngineError::Sealing(_) => Self::Internal(err.to_string()),
        }
    }
}
