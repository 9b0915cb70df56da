//! Records consumed from the tenant, order and bank-account stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use remit_core::{
    Cents, ExternalAccountId, OrderId, RemittanceSchedule, SealedSecret, TaxRate, TenantId,
};
use remit_gateway::BankAccountType;
use remit_state::RecipientType;

/// Postal address. Every field is optional because tenants and checkout
/// forms fill them in unevenly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
    pub country: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub line1: Option<String>,
    pub line2: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Per-tenant tax provider configuration, stored as a JSON blob.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub nexus_addresses: Vec<serde_json::Value>,
    #[serde(default)]
    pub default_product_tax_code: Option<String>,
    #[serde(default = "default_true")]
    pub shipping_taxable: bool,
    #[serde(default = "default_true")]
    pub surcharge_taxable: bool,
    #[serde(default)]
    pub fallback_rate: Option<TaxRate>,
}

impl Default for TaxConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            nexus_addresses: Vec::new(),
            default_product_tax_code: None,
            shipping_taxable: true,
            surcharge_taxable: true,
            fallback_rate: None,
        }
    }
}

impl std::fmt::Debug for TaxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaxConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("nexus_addresses", &self.nexus_addresses.len())
            .field("default_product_tax_code", &self.default_product_tax_code)
            .field("shipping_taxable", &self.shipping_taxable)
            .field("surcharge_taxable", &self.surcharge_taxable)
            .field("fallback_rate", &self.fallback_rate)
            .finish()
    }
}

/// Government recipient bank coordinates in the clear, as entered by an
/// operator or configured as a tenant default. Sealed before persisting.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientDetails {
    #[serde(default)]
    pub recipient_type: RecipientType,
    pub name: String,
    pub routing_number: String,
    pub account_number: String,
}

impl std::fmt::Debug for RecipientDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecipientDetails")
            .field("recipient_type", &self.recipient_type)
            .field("name", &self.name)
            .field("routing_number", &"[REDACTED]")
            .field("account_number", &"[REDACTED]")
            .finish()
    }
}

/// Tax-related settings of one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantTaxSettings {
    pub tenant_id: TenantId,
    /// Display name used on reports.
    #[serde(default)]
    pub name: String,
    /// Case-insensitive provider name.
    #[serde(default = "TenantTaxSettings::default_provider")]
    pub tax_provider: String,
    #[serde(default)]
    pub tax_config: TaxConfig,
    #[serde(default)]
    pub default_tax_rate: Option<TaxRate>,
    #[serde(default)]
    pub remittance_schedule: RemittanceSchedule,
    #[serde(default)]
    pub remittance_enabled: bool,
    #[serde(default)]
    pub origin: Address,
    /// Recipient the scheduler pays automatically.
    #[serde(default)]
    pub remittance_recipient: Option<RecipientDetails>,
}

impl TenantTaxSettings {
    fn default_provider() -> String {
        "builtin".to_string()
    }

    /// Defaults for a tenant with no stored settings.
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            name: String::new(),
            tax_provider: Self::default_provider(),
            tax_config: TaxConfig::default(),
            default_tax_rate: None,
            remittance_schedule: RemittanceSchedule::default(),
            remittance_enabled: false,
            origin: Address::default(),
            remittance_recipient: None,
        }
    }

    /// Name for reports, falling back to the tenant id.
    pub fn display_name(&self) -> String {
        if self.name.trim().is_empty() {
            self.tenant_id.to_string()
        } else {
            self.name.clone()
        }
    }
}

/// A completed or in-progress order, as far as tax is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub tenant_id: TenantId,
    pub tax_amount: Cents,
    pub total_amount: Cents,
    pub status: String,
    pub created_at: DateTime<Utc>,
    /// Destination state or region.
    #[serde(default)]
    pub jurisdiction: Option<String>,
}

impl OrderRecord {
    pub fn is_cancelled(&self) -> bool {
        let status = self.status.trim();
        status.eq_ignore_ascii_case("cancelled") || status.eq_ignore_ascii_case("canceled")
    }
}

/// A tenant's ACH funding account, as linked through the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedBankAccount {
    pub tenant_id: TenantId,
    pub external_account_id: ExternalAccountId,
    pub account_type: BankAccountType,
    pub holder_name: String,
    pub routing_number: SealedSecret,
    pub account_number: SealedSecret,
    pub account_last4: String,
    pub linked_at: DateTime<Utc>,
}

/// One line of an order being quoted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteItem {
    pub id: String,
    pub quantity: u32,
    pub unit_price: Cents,
    #[serde(default)]
    pub tax_code: Option<String>,
}

/// An order at checkout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRequest {
    #[serde(default)]
    pub items: Vec<QuoteItem>,
    pub subtotal: Cents,
    #[serde(default)]
    pub shipping: Cents,
    #[serde(default)]
    pub surcharge: Cents,
    #[serde(default)]
    pub destination: Option<Address>,
}

impl QuoteRequest {
    /// Whether there is nothing to tax at all.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
            && self.subtotal.is_zero()
            && self.shipping.is_zero()
            && self.surcharge.is_zero()
    }
}
