//! # remit-state: Remittance and ACH Payment State Machines
//!
//! ## State Machines
//!
//! - **Remittance** (`remittance.rs`): `Pending → Processing → {Completed, Failed}`
//!   with `Failed → Processing` retry and a direct manual path
//!   `{Pending, Failed} → Completed`. Tracks collected and remitted totals
//!   and keeps `remitted ≤ collected` outside explicit corrections.
//!
//! - **ACH payment** (`ach_payment.rs`): `Pending → {Completed, Failed}`.
//!   Gateway reports are ranked so duplicate and out-of-order deliveries are
//!   recognized and dropped instead of re-applied.
//!
//! Transitions are methods returning `Result`; every status change appends a
//! transition record. Persistence and locking live in `remit-engine`.

pub mod ach_payment;
pub mod remittance;

// ─── Remittance re-exports ──────────────────────────────────────────

pub use remittance::{
    CorrectionRecord, JurisdictionTotal, RemittanceError, RemittanceMethod, RemittanceStatus,
    ReportData, TaxRemittance, TransitionRecord,
};

// ─── ACH payment re-exports ─────────────────────────────────────────

pub use ach_payment::{
    AchPaymentStatus, PaymentReport, RecipientType, ReportEffect, SealedRecipient, TaxAchPayment,
};
