//! # remit-gateway: Clients for External Payment and Tax Rails
//!
//! - **ACH** via the Remitian API ([`RemitianClient`]) behind the
//!   [`AchGateway`] trait, with an in-process [`MockAchGateway`] for tests
//!   and local development.
//! - **Tax calculation** via a TaxJar-compatible `POST /v2/taxes`
//!   ([`TaxJarClient`]).
//!
//! ## Retry Policy
//!
//! Idempotent reads (`GET /payments/{id}`, `GET /recipients`) retry transport
//! failures and 429/502/503/504 answers with exponential backoff, honoring a
//! short `Retry-After`. Payment creation and account linking
//! are sent exactly once: a timed-out `POST /payments` has an unknown outcome
//! and is surfaced as [`AchGatewayError::Unavailable`] for an operator to
//! resolve.

pub mod ach;
pub mod cache;
pub mod config;
pub mod error;
pub mod mock;
pub(crate) mod retry;
pub mod taxjar;

pub use ach::{
    fallback_recipients, AchGateway, BankAccountType, CreatePaymentRequest, CreatedPayment,
    GovernmentRecipient, LinkBankAccountRequest, RemitianClient, RemitianWebhook, TaxType,
    SIGNATURE_HEADER,
};
pub use cache::TtlCache;
pub use config::{AchGatewayConfig, ConfigError, RemitianEnvironment, TaxApiConfig};
pub use error::{AchGatewayError, TaxApiError};
pub use mock::MockAchGateway;
pub use taxjar::{TaxJarBreakdown, TaxJarClient, TaxJarJurisdictions, TaxJarLineItem, TaxJarRequest, TaxJarTax};
