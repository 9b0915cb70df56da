//! # Engine Error Types

use thiserror::Error;

use remit_core::{RemittanceId, TenantId};
use remit_crypto::CryptoError;
use remit_gateway::AchGatewayError;
use remit_state::RemittanceError;

/// Persistence failures, independent of the backing store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not be reached or the query failed.
    #[error("store backend error: {0}")]
    Backend(String),

    /// A conditional write lost to a concurrent update.
    #[error("concurrent update: {0}")]
    Conflict(String),

    /// A stored row could not be decoded.
    #[error("corrupt stored record: {0}")]
    Corrupt(String),
}

/// Errors surfaced by engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("remittance {0} already processed")]
    AlreadyProcessed(RemittanceId),

    #[error("an ACH payment for remittance {0} is already in flight")]
    PaymentInFlight(RemittanceId),

    #[error("tenant {0} has no linked bank account")]
    NoLinkedAccount(TenantId),

    #[error("remittance {0} has nothing left to remit")]
    NothingToRemit(RemittanceId),

    #[error("invalid bank details: {0}")]
    InvalidBankDetails(String),

    #[error("payment rejected by ACH gateway: {0}")]
    PaymentRejected(String),

    #[error("ACH gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error(transparent)]
    Transition(#[from] RemittanceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("account sealing failed: {0}")]
    Sealing(#[from] CryptoError),
}

impl EngineError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound {
            what: what.to_string(),
        }
    }
}

impl From<AchGatewayError> for EngineError {
    fn from(err: AchGatewayError) -> Self {
        match err {
            AchGatewayError::InvalidBankDetails(msg) => Self::InvalidBankDetails(msg),
            AchGatewayError::PaymentRejected { status, body } => {
                Self::PaymentRejected(format!("{status}: {body}"))
            }
            other => Self::GatewayUnavailable(other.to_string()),
        }
    }
}
