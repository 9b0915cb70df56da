//! # remit-core: Foundational Types for the Tax Remittance Engine
//!
//! Every other crate in the workspace depends on `remit-core`; it depends on
//! nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Integer money.** All monetary amounts are [`Cents`] (`i64`). Floats
//!    only appear at the edge of external APIs and are converted once, with
//!    explicit rounding, on the way in.
//!
//! 2. **Exact rates.** [`TaxRate`] stores parts-per-million so configured
//!    rates like `0.08875` survive without binary float drift. Applying a
//!    rate rounds half-up to the cent.
//!
//! 3. **Newtype identifiers.** `TenantId`, `RemittanceId`, `AchPaymentId`,
//!    `OrderId`, `ExternalPaymentId`, `ExternalAccountId`. A remittance id
//!    cannot be passed where a payment id is expected.
//!
//! 4. **Inclusive calendar periods.** [`RemittancePeriod`] is a pair of
//!    inclusive dates validated at construction.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `remit-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod error;
pub mod identity;
pub mod money;
pub mod sealed;
pub mod temporal;

pub use error::ValidationError;
pub use identity::{
    AchPaymentId, ExternalAccountId, ExternalPaymentId, OrderId, RemittanceId, TenantId,
};
pub use money::{format_amount, parse_amount, Cents, TaxRate, DEFAULT_TAX_RATE};
pub use sealed::SealedSecret;
pub use temporal::{PeriodType, RemittancePeriod, RemittanceSchedule};
