//! # Tax Providers
//!
//! A [`TaxProvider`] turns a tenant's configuration and an order into a tax
//! amount and rate. Three implementations:
//!
//! | Provider | Network | Fails |
//! |----------|---------|-------|
//! | [`BuiltinProvider`] | no | never |
//! | [`ExternalApiProvider`] | TaxJar `POST /v2/taxes` | missing key or postal code, transport, 401/403/5xx (unavailable); other 4xx (rejected) |
//! | [`UnimplementedProvider`] | no | always (unavailable) |
//!
//! Money crosses into and out of TaxJar's float representation here and
//! nowhere else.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use remit_core::{Cents, TaxRate, DEFAULT_TAX_RATE};
use remit_gateway::{
    TaxApiConfig, TaxApiError, TaxJarClient, TaxJarLineItem, TaxJarRequest, TaxJarTax,
};

use crate::model::{QuoteRequest, TenantTaxSettings};

/// Why a provider could not produce a quote. Display is the bare reason.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Rejected(String),
}

/// Tax attributed to one jurisdiction level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JurisdictionAmount {
    /// `state`, `county`, `city` or `special_district`.
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub amount: Cents,
}

/// Optional detail accompanying a quote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteBreakdown {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taxable_amount: Option<Cents>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_taxable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surcharge_taxable: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jurisdictions: Vec<JurisdictionAmount>,
}

/// A provider's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderQuote {
    pub amount: Cents,
    pub rate: TaxRate,
    pub breakdown: QuoteBreakdown,
}

#[async_trait]
pub trait TaxProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn quote(
        &self,
        settings: &TenantTaxSettings,
        request: &QuoteRequest,
    ) -> Result<ProviderQuote, ProviderError>;
}

// ─── Builtin ─────────────────────────────────────────────────────────

/// Flat-rate calculator: tenant rate, else configured fallback, else 8.25%.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinProvider;

impl BuiltinProvider {
    pub fn rate_for(settings: &TenantTaxSettings) -> TaxRate {
        settings
            .default_tax_rate
            .or(settings.tax_config.fallback_rate)
            .unwrap_or(DEFAULT_TAX_RATE)
    }

    pub fn compute(&self, settings: &TenantTaxSettings, request: &QuoteRequest) -> ProviderQuote {
        let cfg = &settings.tax_config;
        let mut base = request.subtotal;
        if cfg.shipping_taxable {
            base += request.shipping;
        }
        if cfg.surcharge_taxable {
            base += request.surcharge;
        }
        let rate = Self::rate_for(settings);
        ProviderQuote {
            amount: rate.apply(base),
            rate,
            breakdown: QuoteBreakdown {
                taxable_amount: Some(base),
                shipping_taxable: Some(cfg.shipping_taxable),
                surcharge_taxable: Some(cfg.surcharge_taxable),
                jurisdictions: Vec::new(),
            },
        }
    }
}

#[async_trait]
impl TaxProvider for BuiltinProvider {
    fn name(&self) -> &str {
        "builtin"
    }

    async fn quote(
        &self,
        settings: &TenantTaxSettings,
        request: &QuoteRequest,
    ) -> Result<ProviderQuote, ProviderError> {
        Ok(self.compute(settings, request))
    }
}

// ─── External API ────────────────────────────────────────────────────

/// TaxJar-compatible provider.
pub struct ExternalApiProvider {
    client: TaxJarClient,
    default_api_key: Option<Zeroizing<String>>,
}

impl std::fmt::Debug for ExternalApiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalApiProvider")
            .field("client", &self.client)
            .field(
                "default_api_key",
                &self.default_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl ExternalApiProvider {
    pub fn new(config: &TaxApiConfig) -> Result<Self, TaxApiError> {
        Ok(Self {
            client: TaxJarClient::new(config)?,
            default_api_key: config.default_api_key.clone(),
        })
    }

    fn api_key<'a>(&'a self, settings: &'a TenantTaxSettings) -> Option<&'a str> {
        settings
            .tax_config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .or_else(|| self.default_api_key.as_deref().map(String::as_str))
    }

    fn build_request(
        settings: &TenantTaxSettings,
        request: &QuoteRequest,
    ) -> Result<TaxJarRequest, ProviderError> {
        let origin = &settings.origin;
        let destination = request.destination.clone().unwrap_or_default();
        let to_zip = destination
            .postal_code
            .clone()
            .or_else(|| origin.postal_code.clone())
            .filter(|z| !z.trim().is_empty())
            .ok_or_else(|| {
                ProviderError::Unavailable(
                    "destination postal code is required for TaxJar calculation".into(),
                )
            })?;

        let default_code = settings.tax_config.default_product_tax_code.clone();
        let mut line_items: Vec<TaxJarLineItem> = request
            .items
            .iter()
            .map(|item| TaxJarLineItem {
                id: item.id.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price.to_major_f64(),
                discount: 0.0,
                product_tax_code: item.tax_code.clone().or_else(|| default_code.clone()),
            })
            .collect();
        if request.surcharge.is_positive() {
            line_items.push(TaxJarLineItem {
                id: "surcharge".into(),
                quantity: 1,
                unit_price: request.surcharge.to_major_f64(),
                discount: 0.0,
                product_tax_code: None,
            });
        }

        let nexus = &settings.tax_config.nexus_addresses;
        Ok(TaxJarRequest {
            from_country: origin.country.clone().unwrap_or_else(|| "US".into()),
            from_zip: origin.postal_code.clone(),
            from_state: origin.state.clone(),
            from_city: origin.city.clone(),
            from_street: origin.line1.clone(),
            to_country: destination.country.clone().unwrap_or_else(|| "US".into()),
            to_zip,
            to_state: destination.state.clone(),
            to_city: destination.city.clone(),
            to_street: destination.line1.clone(),
            amount: (request.subtotal + request.surcharge).to_major_f64(),
            shipping: request.shipping.to_major_f64(),
            nexus_addresses: (!nexus.is_empty()).then(|| nexus.clone()),
            line_items,
        })
    }

    fn convert(tax: TaxJarTax) -> Result<ProviderQuote, ProviderError> {
        let amount = tax
            .amount_to_collect
            .and_then(Cents::from_major_f64)
            .ok_or_else(|| {
                ProviderError::Rejected("tax provider returned no usable amount_to_collect".into())
            })?;
        let rate = match tax.effective_rate() {
            Some(r) => TaxRate::from_fraction(r)
                .map_err(|e| ProviderError::Rejected(format!("tax provider returned {e}")))?,
            None => TaxRate::ZERO,
        };

        let mut jurisdictions = Vec::new();
        if let Some(b) = &tax.breakdown {
            let names = tax.jurisdictions.clone().unwrap_or_default();
            let levels = [
                ("state", b.state_tax_collectable, names.state),
                ("county", b.county_tax_collectable, names.county),
                ("city", b.city_tax_collectable, names.city),
                ("special_district", b.special_district_tax_collectable, None),
            ];
            for (level, value, name) in levels {
                if let Some(amount) = value.and_then(Cents::from_major_f64) {
                    jurisdictions.push(JurisdictionAmount {
                        level: level.to_string(),
                        name,
                        amount,
                    });
                }
            }
        }

        Ok(ProviderQuote {
            amount,
            rate,
            breakdown: QuoteBreakdown {
                jurisdictions,
                ..QuoteBreakdown::default()
            },
        })
    }
}

#[async_trait]
impl TaxProvider for ExternalApiProvider {
    fn name(&self) -> &str {
        "taxjar"
    }

    async fn quote(
        &self,
        settings: &TenantTaxSettings,
        request: &QuoteRequest,
    ) -> Result<ProviderQuote, ProviderError> {
        let api_key = self
            .api_key(settings)
            .ok_or_else(|| ProviderError::Unavailable("missing TaxJar API key".into()))?;
        let body = Self::build_request(settings, request)?;

        let tax = self.client.calculate(api_key, &body).await.map_err(|e| {
            if e.is_unavailable() {
                ProviderError::Unavailable(format!("tax provider unavailable: {e}"))
            } else {
                ProviderError::Rejected(format!("tax provider rejected the request: {e}"))
            }
        })?;
        Self::convert(tax)
    }
}

// ─── Unimplemented ───────────────────────────────────────────────────

/// Stand-in for a provider name with no integration.
#[derive(Debug, Clone)]
pub struct UnimplementedProvider {
    name: String,
}

impl UnimplementedProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl TaxProvider for UnimplementedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn quote(
        &self,
        _settings: &TenantTaxSettings,
        _request: &QuoteRequest,
    ) -> Result<ProviderQuote, ProviderError> {
        Err(ProviderError::Unavailable(format!(
            "tax provider '{}' is not implemented",
            self.name
        )))
    }
}
