//! # Tenant Tax Settings API
//!
//! - **GET `/v1/tax/settings/:tenant_id`**: current settings
//! - **PUT `/v1/tax/settings/:tenant_id`**: partial update
//!
//! The provider API key and recipient bank numbers are write-only: views
//! report whether a key is set and the last four account digits.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use remit_core::sealed::last4;
use remit_core::{RemittanceSchedule, TaxRate, TenantId};
use remit_engine::{Address, RecipientDetails, TenantTaxSettings};
use remit_state::RecipientType;

use super::ach::RecipientBody;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::state::AppState;

const KNOWN_PROVIDERS: &[&str] = &["builtin", "taxjar", "external-api", "avalara", "stripe"];

/// Partial settings update. Absent fields keep their stored value.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateSettingsRequest {
    pub name: Option<String>,
    /// builtin, taxjar, avalara or stripe.
    pub tax_provider: Option<String>,
    /// Provider API key; an empty string clears it.
    pub api_key: Option<String>,
    pub shipping_taxable: Option<bool>,
    pub surcharge_taxable: Option<bool>,
    pub default_product_tax_code: Option<String>,
    /// Fraction, e.g. 0.0825.
    #[schema(value_type = Option<f64>, example = 0.0825)]
    pub default_tax_rate: Option<TaxRate>,
    #[schema(value_type = Option<String>, example = "monthly")]
    pub remittance_schedule: Option<RemittanceSchedule>,
    pub remittance_enabled: Option<bool>,
    #[schema(value_type = Option<Object>)]
    pub origin: Option<Address>,
    pub remittance_recipient: Option<RecipientBody>,
}

impl Validate for UpdateSettingsRequest {
    fn validate(&self) -> Result<(), String> {
        if let Some(provider) = &self.tax_provider {
            let normalized = provider.trim().to_ascii_lowercase();
            if !KNOWN_PROVIDERS.contains(&normalized.as_str()) {
                return Err(format!(
                    "tax_provider must be one of {}",
                    KNOWN_PROVIDERS.join(", ")
                ));
            }
        }
        if let Some(recipient) = &self.remittance_recipient {
            if recipient.name.trim().is_empty() {
                return Err("remittance_recipient.name must not be empty".to_string());
            }
        }
        Ok(())
    }
}

impl UpdateSettingsRequest {
    fn apply(self, settings: &mut TenantTaxSettings) {
        if let Some(name) = self.name {
            settings.name = name.trim().to_string();
        }
        if let Some(provider) = self.tax_provider {
            settings.tax_provider = provider.trim().to_ascii_lowercase();
        }
        if let Some(key) = self.api_key {
            let key = key.trim();
            settings.tax_config.api_key = (!key.is_empty()).then(|| key.to_string());
        }
        if let Some(v) = self.shipping_taxable {
            settings.tax_config.shipping_taxable = v;
        }
        if let Some(v) = self.surcharge_taxable {
            settings.tax_config.surcharge_taxable = v;
        }
        if let Some(code) = self.default_product_tax_code {
            settings.tax_config.default_product_tax_code = Some(code);
        }
        if let Some(rate) = self.default_tax_rate {
            settings.default_tax_rate = Some(rate);
        }
        if let Some(schedule) = self.remittance_schedule {
            settings.remittance_schedule = schedule;
        }
        if let Some(enabled) = self.remittance_enabled {
            settings.remittance_enabled = enabled;
        }
        if let Some(origin) = self.origin {
            settings.origin = origin;
        }
        if let Some(recipient) = self.remittance_recipient {
            settings.remittance_recipient = Some(RecipientDetails::from(recipient));
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecipientView {
    pub recipient_type: RecipientType,
    pub name: String,
    pub account_last4: String,
}

/// Settings as returned to operators.
#[derive(Debug, Serialize)]
pub struct SettingsView {
    pub tenant_id: TenantId,
    pub name: String,
    pub tax_provider: String,
    pub api_key_configured: bool,
    pub shipping_taxable: bool,
    pub surcharge_taxable: bool,
    pub default_product_tax_code: Option<String>,
    pub default_tax_rate: Option<TaxRate>,
    pub remittance_schedule: RemittanceSchedule,
    pub remittance_enabled: bool,
    pub origin: Address,
    pub remittance_recipient: Option<RecipientView>,
}

impl From<&TenantTaxSettings> for SettingsView {
    fn from(s: &TenantTaxSettings) -> Self {
        Self {
            tenant_id: s.tenant_id,
            name: s.name.clone(),
            tax_provider: s.tax_provider.clone(),
            api_key_configured: s.tax_config.api_key.is_some(),
            shipping_taxable: s.tax_config.shipping_taxable,
            surcharge_taxable: s.tax_config.surcharge_taxable,
            default_product_tax_code: s.tax_config.default_product_tax_code.clone(),
            default_tax_rate: s.default_tax_rate,
            remittance_schedule: s.remittance_schedule,
            remittance_enabled: s.remittance_enabled,
            origin: s.origin.clone(),
            remittance_recipient: s.remittance_recipient.as_ref().map(|r| RecipientView {
                recipient_type: r.recipient_type,
                name: r.name.clone(),
                account_last4: last4(&r.account_number),
            }),
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/v1/tax/settings/:tenant_id",
        get(get_settings).put(update_settings),
    )
}

/// GET /v1/tax/settings/:tenant_id
#[utoipa::path(
    get,
    path = "/v1/tax/settings/{tenant_id}",
    params(("tenant_id" = Uuid, Path, description = "Tenant")),
    responses((status = 200, description = "Tenant tax settings, defaults when none are stored")),
    tag = "settings"
)]
pub async fn get_settings(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<SettingsView>, AppError> {
    let settings = super::tenant_settings(&state, TenantId::from_uuid(tenant_id)).await?;
    Ok(Json(SettingsView::from(&settings)))
}

/// PUT /v1/tax/settings/:tenant_id
#[utoipa::path(
    put,
    path = "/v1/tax/settings/{tenant_id}",
    params(("tenant_id" = Uuid, Path, description = "Tenant")),
    request_body = UpdateSettingsRequest,
    responses(
        (status = 200, description = "Updated settings"),
        (status = 422, description = "Invalid settings", body = crate::error::ErrorBody),
    ),
    tag = "settings"
)]
pub async fn update_settings(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    body: Result<Json<UpdateSettingsRequest>, JsonRejection>,
) -> Result<Json<SettingsView>, AppError> {
    let req = extract_validated_json(body)?;
    let tenant_id = TenantId::from_uuid(tenant_id);
    let mut settings = super::tenant_settings(&state, tenant_id).await?;
    req.apply(&mut settings);
    state
        .directory
        .save_tax_settings(&settings)
        .await
        .map_err(remit_engine::EngineError::from)?;
    tracing::info!(
        tenant_id = %tenant_id,
        provider = %settings.tax_provider,
        remittance_enabled = settings.remittance_enabled,
        "tax settings updated"
    );
    Ok(Json(SettingsView::from(&settings)))
}
