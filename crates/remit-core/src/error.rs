//! # Validation Errors
//!
//! Construction-time failures for the value types in this crate. Every
//! validated constructor returns one of these instead of panicking.

use thiserror::Error;

/// A value failed validation at construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Monetary amount could not be parsed or is out of range.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Tax rate could not be parsed or is outside `[0, 1]`.
    #[error("invalid tax rate: {0}")]
    InvalidRate(String),

    /// Period bounds are inconsistent or unrepresentable.
    #[error("invalid period: {0}")]
    InvalidPeriod(String),

    /// External identifier is empty or too long.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Enumerated value not recognized.
    #[error("unknown {kind}: {value}")]
    UnknownVariant {
        /// What was being parsed (e.g. "remittance schedule").
        kind: &'static str,
        /// The rejected input.
        value: String,
    },
}
