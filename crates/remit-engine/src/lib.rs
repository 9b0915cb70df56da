//! # remit-engine: Tax Quoting and Remittance Orchestration
//!
//! ## Components
//!
//! - [`provider`]: the [`TaxProvider`](provider::TaxProvider) trait with the
//!   builtin flat-rate calculator, the TaxJar-backed external provider and a
//!   placeholder for providers that are named but not integrated.
//! - [`quote`]: provider selection with a single catch-and-substitute
//!   fallback to the builtin calculator.
//! - [`aggregate`]: tax collected per tenant and period, by jurisdiction.
//! - [`remittance`]: the record manager owning `TaxRemittance` rows.
//! - [`reconcile`]: ACH initiation plus the single choke point through which
//!   every gateway report (poll or webhook) flows.
//! - [`schedule`]: creates and initiates last period's remittance for
//!   tenants that opted in.
//! - [`report`]: CSV and HTML projections and the period summary.
//!
//! ## Concurrency
//!
//! Operations that change a remittance take its entry in
//! [`RemittanceLocks`](locks::RemittanceLocks) for their whole duration,
//! and the store applies those changes as compare-and-swap updates against
//! the status read under the lock. The in-process lock orders work within
//! one instance; the store check catches everything else.
//!
//! Storage is behind the traits in [`store`]; in-memory implementations live
//! alongside them and the Postgres ones in `remit-api`.

pub mod aggregate;
pub mod audit;
pub mod error;
pub mod locks;
pub mod model;
pub mod provider;
pub mod quote;
pub mod reconcile;
pub mod remittance;
pub mod report;
pub mod schedule;
pub mod store;

pub use aggregate::{AggregateSummary, RemittanceAggregator};
pub use audit::{AuditEvent, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use error::{EngineError, StoreError};
pub use locks::RemittanceLocks;
pub use model::{
    Address, LinkedBankAccount, OrderRecord, QuoteItem, QuoteRequest, RecipientDetails, TaxConfig,
    TenantTaxSettings,
};
pub use provider::{
    BuiltinProvider, ExternalApiProvider, JurisdictionAmount, ProviderError, ProviderQuote,
    QuoteBreakdown, TaxProvider, UnimplementedProvider,
};
pub use quote::{QuoteService, TaxQuote};
pub use reconcile::{AchReconciler, InitiatedPayment, ReconcileOutcome, SweepSummary};
pub use remittance::{CreateOutcome, RemittanceManager, Settlement};
pub use report::{PeriodReport, RemittanceSummary, ReportGenerator};
pub use schedule::{RemittanceScheduler, ScheduleRun};
pub use store::{
    MemoryOrderSource, MemoryRemittanceStore, MemoryTenantDirectory, OrderSource,
    RemittanceStore, TenantDirectory,
};
