//! # Storage Seams
//!
//! The engine reads orders and tenant configuration it does not own, and owns
//! remittance and ACH payment records. Each is a trait here so the same
//! engine runs against the in-memory implementations below (tests, local
//! development) and the Postgres ones in `remit-api`.
//!
//! ## Conditional writes
//!
//! Every write that moves a remittance or payment names the status it read.
//! Implementations apply the write only if the stored status still matches,
//! and report whether it did. Multi-record writes are all-or-nothing.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use remit_core::{ExternalPaymentId, RemittanceId, RemittancePeriod, TenantId};
use remit_state::{AchPaymentStatus, RemittanceStatus, TaxAchPayment, TaxRemittance};

use crate::error::StoreError;
use crate::model::{LinkedBankAccount, OrderRecord, TenantTaxSettings};

/// Read access to the order store.
#[async_trait]
pub trait OrderSource: Send + Sync {
    /// Orders of `tenant_id` created in `[start, end_exclusive)`, any status.
    async fn orders_in_range(
        &self,
        tenant_id: TenantId,
        start: DateTime<Utc>,
        end_exclusive: DateTime<Utc>,
    ) -> Result<Vec<OrderRecord>, StoreError>;
}

/// Tenant configuration and linked funding accounts.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn tax_settings(
        &self,
        tenant_id: TenantId,
    ) -> Result<Option<TenantTaxSettings>, StoreError>;

    async fn save_tax_settings(&self, settings: &TenantTaxSettings) -> Result<(), StoreError>;

    async fn linked_account(
        &self,
        tenant_id: TenantId,
    ) -> Result<Option<LinkedBankAccount>, StoreError>;

    /// Insert or replace the tenant's linked account.
    async fn save_linked_account(&self, account: &LinkedBankAccount) -> Result<(), StoreError>;

    /// Settings of every tenant with `remittance_enabled`.
    async fn remittance_enabled_tenants(&self) -> Result<Vec<TenantTaxSettings>, StoreError>;
}

/// Remittance and ACH payment records.
#[async_trait]
pub trait RemittanceStore: Send + Sync {
    /// Insert `remittance` unless the tenant already has one whose period
    /// overlaps it. Returns the stored record and whether it was inserted.
    async fn insert_remittance_if_absent(
        &self,
        remittance: TaxRemittance,
    ) -> Result<(TaxRemittance, bool), StoreError>;

    async fn get_remittance(&self, id: RemittanceId)
        -> Result<Option<TaxRemittance>, StoreError>;

    /// Replace the stored remittance if its status is still `expected`.
    async fn save_remittance(
        &self,
        remittance: &TaxRemittance,
        expected: RemittanceStatus,
    ) -> Result<bool, StoreError>;

    /// Most recent first by period start.
    async fn list_remittances(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> Result<Vec<TaxRemittance>, StoreError>;

    async fn list_by_status(
        &self,
        status: RemittanceStatus,
    ) -> Result<Vec<TaxRemittance>, StoreError>;

    /// Remittances of `tenant_id` overlapping `period`, oldest first.
    async fn remittances_overlapping(
        &self,
        tenant_id: TenantId,
        period: &RemittancePeriod,
    ) -> Result<Vec<TaxRemittance>, StoreError>;

    /// Oldest first.
    async fn payments_for_remittance(
        &self,
        remittance_id: RemittanceId,
    ) -> Result<Vec<TaxAchPayment>, StoreError>;

    async fn payment_by_external_id(
        &self,
        external_id: &ExternalPaymentId,
    ) -> Result<Option<TaxAchPayment>, StoreError>;

    /// Insert a freshly submitted payment and save the remittance it moved
    /// to `processing`, atomically.
    ///
    /// Fails with [`StoreError::Conflict`] and writes nothing if the
    /// remittance status is no longer `expected` or another non-failed
    /// payment exists for it.
    async fn record_initiation(
        &self,
        payment: &TaxAchPayment,
        remittance: &TaxRemittance,
        expected: RemittanceStatus,
    ) -> Result<(), StoreError>;

    /// Save a reconciled payment, and optionally its remittance, if the
    /// payment status is still `expected_payment` and the remittance status
    /// still matches. Returns `false` and writes nothing otherwise.
    async fn apply_reconciliation(
        &self,
        payment: &TaxAchPayment,
        expected_payment: AchPaymentStatus,
        remittance: Option<(&TaxRemittance, RemittanceStatus)>,
    ) -> Result<bool, StoreError>;
}

// ─── In-memory implementations ───────────────────────────────────────

/// Orders held in memory.
#[derive(Debug, Default)]
pub struct MemoryOrderSource {
    orders: RwLock<Vec<OrderRecord>>,
}

impl MemoryOrderSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_order(&self, order: OrderRecord) {
        self.orders.write().push(order);
    }
}

#[async_trait]
impl OrderSource for MemoryOrderSource {
    async fn orders_in_range(
        &self,
        tenant_id: TenantId,
        start: DateTime<Utc>,
        end_exclusive: DateTime<Utc>,
    ) -> Result<Vec<OrderRecord>, StoreError> {
        Ok(self
            .orders
            .read()
            .iter()
            .filter(|o| o.tenant_id == tenant_id && o.created_at >= start && o.created_at < end_exclusive)
            .cloned()
            .collect())
    }
}

/// Tenant settings and linked accounts held in memory.
#[derive(Debug, Default)]
pub struct MemoryTenantDirectory {
    settings: RwLock<HashMap<TenantId, TenantTaxSettings>>,
    accounts: RwLock<HashMap<TenantId, LinkedBankAccount>>,
}

impl MemoryTenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_settings(&self, settings: TenantTaxSettings) {
        self.settings.write().insert(settings.tenant_id, settings);
    }
}

#[async_trait]
impl TenantDirectory for MemoryTenantDirectory {
    async fn tax_settings(
        &self,
        tenant_id: TenantId,
    ) -> Result<Option<TenantTaxSettings>, StoreError> {
        Ok(self.settings.read().get(&tenant_id).cloned())
    }

    async fn save_tax_settings(&self, settings: &TenantTaxSettings) -> Result<(), StoreError> {
        self.upsert_settings(settings.clone());
        Ok(())
    }

    async fn linked_account(
        &self,
        tenant_id: TenantId,
    ) -> Result<Option<LinkedBankAccount>, StoreError> {
        Ok(self.accounts.read().get(&tenant_id).cloned())
    }

    async fn save_linked_account(&self, account: &LinkedBankAccount) -> Result<(), StoreError> {
        self.accounts
            .write()
            .insert(account.tenant_id, account.clone());
        Ok(())
    }

    async fn remittance_enabled_tenants(&self) -> Result<Vec<TenantTaxSettings>, StoreError> {
        let mut enabled: Vec<_> = self
            .settings
            .read()
            .values()
            .filter(|s| s.remittance_enabled)
            .cloned()
            .collect();
        enabled.sort_by_key(|s| s.tenant_id);
        Ok(enabled)
    }
}

#[derive(Debug, Default)]
struct Records {
    remittances: HashMap<RemittanceId, TaxRemittance>,
    payments: Vec<TaxAchPayment>,
}

/// Remittances and payments held in memory behind one lock, so multi-record
/// writes are atomic.
#[derive(Debug, Default)]
pub struct MemoryRemittanceStore {
    records: RwLock<Records>,
}

impl MemoryRemittanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RemittanceStore for MemoryRemittanceStore {
    async fn insert_remittance_if_absent(
        &self,
        remittance: TaxRemittance,
    ) -> Result<(TaxRemittance, bool), StoreError> {
        let mut records = self.records.write();
        let existing = records
            .remittances
            .values()
            .filter(|r| r.tenant_id == remittance.tenant_id && r.period.overlaps(&remittance.period))
            .min_by_key(|r| r.created_at)
            .cloned();
        if let Some(existing) = existing {
            return Ok((existing, false));
        }
        records
            .remittances
            .insert(remittance.id, remittance.clone());
        Ok((remittance, true))
    }

    async fn get_remittance(
        &self,
        id: RemittanceId,
    ) -> Result<Option<TaxRemittance>, StoreError> {
        Ok(self.records.read().remittances.get(&id).cloned())
    }

    async fn save_remittance(
        &self,
        remittance: &TaxRemittance,
        expected: RemittanceStatus,
    ) -> Result<bool, StoreError> {
        let mut records = self.records.write();
        match records.remittances.get_mut(&remittance.id) {
            Some(stored) if stored.status == expected => {
                *stored = remittance.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::Conflict(format!(
                "remittance {} does not exist",
                remittance.id
            ))),
        }
    }

    async fn list_remittances(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> Result<Vec<TaxRemittance>, StoreError> {
        let mut list: Vec<_> = self
            .records
            .read()
            .remittances
            .values()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.period.start().cmp(&a.period.start()));
        list.truncate(limit);
        Ok(list)
    }

    async fn list_by_status(
        &self,
        status: RemittanceStatus,
    ) -> Result<Vec<TaxRemittance>, StoreError> {
        let mut list: Vec<_> = self
            .records
            .read()
            .remittances
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        list.sort_by_key(|r| r.updated_at);
        Ok(list)
    }

    async fn remittances_overlapping(
        &self,
        tenant_id: TenantId,
        period: &RemittancePeriod,
    ) -> Result<Vec<TaxRemittance>, StoreError> {
        let mut list: Vec<_> = self
            .records
            .read()
            .remittances
            .values()
            .filter(|r| r.tenant_id == tenant_id && r.period.overlaps(period))
            .cloned()
            .collect();
        list.sort_by_key(|r| r.period.start());
        Ok(list)
    }

    async fn payments_for_remittance(
        &self,
        remittance_id: RemittanceId,
    ) -> Result<Vec<TaxAchPayment>, StoreError> {
        Ok(self
            .records
            .read()
            .payments
            .iter()
            .filter(|p| p.remittance_id == remittance_id)
            .cloned()
            .collect())
    }

    async fn payment_by_external_id(
        &self,
        external_id: &ExternalPaymentId,
    ) -> Result<Option<TaxAchPayment>, StoreError> {
        Ok(self
            .records
            .read()
            .payments
            .iter()
            .find(|p| p.external_payment_id.as_ref() == Some(external_id))
            .cloned())
    }

    async fn record_initiation(
        &self,
        payment: &TaxAchPayment,
        remittance: &TaxRemittance,
        expected: RemittanceStatus,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write();
        let active = records
            .payments
            .iter()
            .any(|p| p.remittance_id == remittance.id && p.is_active());
        if active {
            return Err(StoreError::Conflict(format!(
                "remittance {} already has an active payment",
                remittance.id
            )));
        }
        match records.remittances.get_mut(&remittance.id) {
            Some(stored) if stored.status == expected => {
                *stored = remittance.clone();
            }
            Some(stored) => {
                return Err(StoreError::Conflict(format!(
                    "remittance {} moved to {} concurrently",
                    remittance.id, stored.status
                )));
            }
            None => {
                return Err(StoreError::Conflict(format!(
                    "remittance {} does not exist",
                    remittance.id
                )));
            }
        }
        records.payments.push(payment.clone());
        Ok(())
    }

    async fn apply_reconciliation(
        &self,
        payment: &TaxAchPayment,
        expected_payment: AchPaymentStatus,
        remittance: Option<(&TaxRemittance, RemittanceStatus)>,
    ) -> Result<bool, StoreError> {
        let mut records = self.records.write();
        let Some(pos) = records.payments.iter().position(|p| p.id == payment.id) else {
            return Ok(false);
        };
        if records.payments[pos].status != expected_payment {
            return Ok(false);
        }
        if let Some((r, expected)) = remittance {
            match records.remittances.get_mut(&r.id) {
                Some(stored) if stored.status == expected => *stored = r.clone(),
                _ => return Ok(false),
            }
        }
        records.payments[pos] = payment.clone();
        Ok(true)
    }
}
