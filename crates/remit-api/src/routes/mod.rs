//! # API Route Modules
//!
//! - `quote`: checkout tax quotes with builtin fallback.
//! - `remittances`: remittance status, creation, manual attestation,
//!   corrections and report documents.
//! - `ach`: funding account linking, recipient directory, ACH initiation,
//!   polling, the reconciliation sweep, and the gateway webhook.
//! - `reports`: period summaries across orders and remittances.
//! - `scheduler`: scheduled remittance runs.
//! - `settings`: per-tenant tax settings.

pub mod ach;
pub mod quote;
pub mod remittances;
pub mod reports;
pub mod scheduler;
pub mod settings;

use remit_core::TenantId;
use remit_engine::TenantTaxSettings;

use crate::error::AppError;
use crate::state::AppState;

/// Stored settings of `tenant_id`, or the defaults for a tenant that never
/// saved any.
pub(crate) async fn tenant_settings(
    state: &AppState,
    tenant_id: TenantId,
) -> Result<TenantTaxSettings, AppError> {
    let stored = state
        .directory
        .tax_settings(tenant_id)
        .await
        .map_err(remit_engine::EngineError::from)?;
    Ok(stored.unwrap_or_else(|| TenantTaxSettings::new(tenant_id)))
}
