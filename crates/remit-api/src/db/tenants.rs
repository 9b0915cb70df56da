//! Tenant tax settings and linked funding accounts.
//!
//! Recipient bank numbers in `remittance_recipient` are sealed with the
//! service's [`AccountSealer`] before they reach the JSONB column and
//! unsealed on read.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use remit_core::{ExternalAccountId, RemittanceSchedule, SealedSecret, TaxRate, TenantId};
use remit_crypto::AccountSealer;
use remit_engine::{
    Address, LinkedBankAccount, RecipientDetails, StoreError, TaxConfig, TenantDirectory,
    TenantTaxSettings,
};
use remit_gateway::BankAccountType;
use remit_state::RecipientType;

use super::{backend, corrupt};

pub struct PgTenantDirectory {
    pool: PgPool,
    sealer: Arc<AccountSealer>,
}

impl PgTenantDirectory {
    pub fn new(pool: PgPool, sealer: Arc<AccountSealer>) -> Self {
        Self { pool, sealer }
    }

    fn seal_recipient(&self, r: &RecipientDetails) -> Result<StoredRecipient, StoreError> {
        let seal = |v: &str| {
            self.sealer
                .seal(v.trim())
                .map(|s| s.as_str().to_string())
                .map_err(|e| StoreError::Backend(format!("sealing recipient: {e}")))
        };
        Ok(StoredRecipient {
            recipient_type: r.recipient_type,
            name: r.name.clone(),
            routing_number: seal(&r.routing_number)?,
            account_number: seal(&r.account_number)?,
        })
    }

    fn unseal_recipient(&self, stored: StoredRecipient) -> Result<RecipientDetails, StoreError> {
        let unseal = |v: String| {
            self.sealer
                .unseal(&SealedSecret::from_stored(v))
                .map(|clear| clear.to_string())
                .map_err(|e| corrupt("remittance recipient", e))
        };
        Ok(RecipientDetails {
            recipient_type: stored.recipient_type,
            name: stored.name,
            routing_number: unseal(stored.routing_number)?,
            account_number: unseal(stored.account_number)?,
        })
    }

    fn settings_from_row(&self, row: SettingsRow) -> Result<TenantTaxSettings, StoreError> {
        let tenant_id = TenantId::from_uuid(row.tenant_id);
        let tax_config: TaxConfig = serde_json::from_value(row.tax_config)
            .map_err(|e| corrupt("tax_config", e))?;
        let origin: Address =
            serde_json::from_value(row.origin).map_err(|e| corrupt("origin", e))?;
        let default_tax_rate = row
            .default_tax_rate_ppm
            .map(|ppm| {
                u32::try_from(ppm)
                    .map_err(|e| corrupt("default_tax_rate_ppm", e))
                    .and_then(|ppm| {
                        TaxRate::from_ppm(ppm).map_err(|e| corrupt("default_tax_rate_ppm", e))
                    })
            })
            .transpose()?;
        let remittance_schedule: RemittanceSchedule = row
            .remittance_schedule
            .parse()
            .map_err(|e| corrupt("remittance_schedule", e))?;
        let remittance_recipient = row
            .remittance_recipient
            .map(|v| {
                serde_json::from_value::<StoredRecipient>(v)
                    .map_err(|e| corrupt("remittance_recipient", e))
                    .and_then(|stored| self.unseal_recipient(stored))
            })
            .transpose()?;

        Ok(TenantTaxSettings {
            tenant_id,
            name: row.name,
            tax_provider: row.tax_provider,
            tax_config,
            default_tax_rate,
            remittance_schedule,
            remittance_enabled: row.remittance_enabled,
            origin,
            remittance_recipient,
        })
    }
}

const SETTINGS_COLUMNS: &str = "tenant_id, name, tax_provider, tax_config, default_tax_rate_ppm,
     remittance_schedule, remittance_enabled, origin, remittance_recipient";

#[async_trait]
impl TenantDirectory for PgTenantDirectory {
    async fn tax_settings(
        &self,
        tenant_id: TenantId,
    ) -> Result<Option<TenantTaxSettings>, StoreError> {
        let row = sqlx::query_as::<_, SettingsRow>(&format!(
            "SELECT {SETTINGS_COLUMNS} FROM tenant_tax_settings WHERE tenant_id = $1"
        ))
        .bind(*tenant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(|r| self.settings_from_row(r)).transpose()
    }

    async fn save_tax_settings(&self, settings: &TenantTaxSettings) -> Result<(), StoreError> {
        let tax_config =
            serde_json::to_value(&settings.tax_config).map_err(|e| corrupt("tax_config", e))?;
        let origin = serde_json::to_value(&settings.origin).map_err(|e| corrupt("origin", e))?;
        let recipient = settings
            .remittance_recipient
            .as_ref()
            .map(|r| {
                self.seal_recipient(r).and_then(|stored| {
                    serde_json::to_value(stored).map_err(|e| corrupt("remittance_recipient", e))
                })
            })
            .transpose()?;
        let rate_ppm = settings
            .default_tax_rate
            .map(|r| i32::try_from(r.ppm()).map_err(|e| corrupt("default_tax_rate", e)))
            .transpose()?;

        sqlx::query(
            "INSERT INTO tenant_tax_settings (tenant_id, name, tax_provider, tax_config,
             default_tax_rate_ppm, remittance_schedule, remittance_enabled, origin,
             remittance_recipient, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
             ON CONFLICT (tenant_id) DO UPDATE SET
               name = EXCLUDED.name,
               tax_provider = EXCLUDED.tax_provider,
               tax_config = EXCLUDED.tax_config,
               default_tax_rate_ppm = EXCLUDED.default_tax_rate_ppm,
               remittance_schedule = EXCLUDED.remittance_schedule,
               remittance_enabled = EXCLUDED.remittance_enabled,
               origin = EXCLUDED.origin,
               remittance_recipient = EXCLUDED.remittance_recipient,
               updated_at = NOW()",
        )
        .bind(*settings.tenant_id.as_uuid())
        .bind(&settings.name)
        .bind(&settings.tax_provider)
        .bind(tax_config)
        .bind(rate_ppm)
        .bind(settings.remittance_schedule.as_str())
        .bind(settings.remittance_enabled)
        .bind(origin)
        .bind(recipient)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn linked_account(
        &self,
        tenant_id: TenantId,
    ) -> Result<Option<LinkedBankAccount>, StoreError> {
        let row = sqlx::query_as::<_, LinkedAccountRow>(
            "SELECT tenant_id, external_account_id, account_type, holder_name,
             routing_number, account_number, account_last4, linked_at
             FROM linked_bank_accounts WHERE tenant_id = $1",
        )
        .bind(*tenant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(LinkedAccountRow::into_record).transpose()
    }

    async fn save_linked_account(&self, account: &LinkedBankAccount) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO linked_bank_accounts (tenant_id, external_account_id, account_type,
             holder_name, routing_number, account_number, account_last4, linked_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (tenant_id) DO UPDATE SET
               external_account_id = EXCLUDED.external_account_id,
               account_type = EXCLUDED.account_type,
               holder_name = EXCLUDED.holder_name,
               routing_number = EXCLUDED.routing_number,
               account_number = EXCLUDED.account_number,
               account_last4 = EXCLUDED.account_last4,
               linked_at = EXCLUDED.linked_at",
        )
        .bind(*account.tenant_id.as_uuid())
        .bind(account.external_account_id.as_str())
        .bind(account.account_type.as_str())
        .bind(&account.holder_name)
        .bind(account.routing_number.as_str())
        .bind(account.account_number.as_str())
        .bind(&account.account_last4)
        .bind(account.linked_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn remittance_enabled_tenants(&self) -> Result<Vec<TenantTaxSettings>, StoreError> {
        let rows = sqlx::query_as::<_, SettingsRow>(&format!(
            "SELECT {SETTINGS_COLUMNS} FROM tenant_tax_settings
             WHERE remittance_enabled ORDER BY tenant_id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter()
            .map(|r| self.settings_from_row(r))
            .collect()
    }
}

/// Recipient as persisted, with sealed bank numbers.
#[derive(Serialize, Deserialize)]
struct StoredRecipient {
    recipient_type: RecipientType,
    name: String,
    routing_number: String,
    account_number: String,
}

#[derive(sqlx::FromRow)]
struct SettingsRow {
    tenant_id: Uuid,
    name: String,
    tax_provider: String,
    tax_config: serde_json::Value,
    default_tax_rate_ppm: Option<i32>,
    remittance_schedule: String,
    remittance_enabled: bool,
    origin: serde_json::Value,
    remittance_recipient: Option<serde_json::Value>,
}

#[derive(sqlx::FromRow)]
struct LinkedAccountRow {
    tenant_id: Uuid,
    external_account_id: String,
    account_type: String,
    holder_name: String,
    routing_number: String,
    account_number: String,
    account_last4: String,
    linked_at: DateTime<Utc>,
}

impl LinkedAccountRow {
    fn into_record(self) -> Result<LinkedBankAccount, StoreError> {
        let account_type: BankAccountType = self
            .account_type
            .parse()
            .map_err(|e| corrupt("account_type", e))?;
        Ok(LinkedBankAccount {
            tenant_id: TenantId::from_uuid(self.tenant_id),
            external_account_id: ExternalAccountId::new(self.external_account_id)
                .map_err(|e| corrupt("external_account_id", e))?,
            account_type,
            holder_name: self.holder_name,
            routing_number: SealedSecret::from_stored(self.routing_number),
            account_number: SealedSecret::from_stored(self.account_number),
            account_last4: self.account_last4,
            linked_at: self.linked_at,
        })
    }
}
