//! Remittance and ACH payment persistence.
//!
//! Scalar fields are columns; the transition log, corrections and the
//! aggregation snapshot are JSONB. Multi-row writes run in one transaction
//! and every status change is guarded by `WHERE status = <expected>`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use remit_core::{
    AchPaymentId, Cents, ExternalAccountId, ExternalPaymentId, PeriodType, RemittanceId,
    RemittancePeriod, SealedSecret, TenantId,
};
use remit_engine::{RemittanceStore, StoreError};
use remit_state::{
    AchPaymentStatus, RecipientType, RemittanceMethod, RemittanceStatus, SealedRecipient,
    TaxAchPayment, TaxRemittance,
};

use super::{backend, corrupt};

const REMITTANCE_COLUMNS: &str = "id, tenant_id, period_start, period_end, period_type,
     total_tax_collected, total_tax_remitted, status, method, remittance_date,
     remittance_reference, report_data, notes, transitions, corrections, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, tenant_id, remittance_id, external_payment_id,
     recipient_type, recipient_name, routing_number, account_number, account_last4,
     funding_account_id, amount, status, confirmation_number, error_message, processed_at,
     created_at, updated_at";

pub struct PgRemittanceStore {
    pool: PgPool,
}

impl PgRemittanceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RemittanceStore for PgRemittanceStore {
    async fn insert_remittance_if_absent(
        &self,
        remittance: TaxRemittance,
    ) -> Result<(TaxRemittance, bool), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        // Serialize creators per tenant so the overlap check and insert are
        // one step.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(remittance.tenant_id.as_uuid().to_string())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        let existing = sqlx::query_as::<_, RemittanceRow>(&format!(
            "SELECT {REMITTANCE_COLUMNS} FROM tax_remittances
             WHERE tenant_id = $1 AND period_start <= $3 AND period_end >= $2
             ORDER BY created_at LIMIT 1"
        ))
        .bind(*remittance.tenant_id.as_uuid())
        .bind(remittance.period.start())
        .bind(remittance.period.end())
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?;

        if let Some(row) = existing {
            tx.rollback().await.map_err(backend)?;
            return Ok((row.into_record()?, false));
        }

        let json = RemittanceJson::of(&remittance)?;
        sqlx::query(&format!(
            "INSERT INTO tax_remittances ({REMITTANCE_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)"
        ))
        .bind(*remittance.id.as_uuid())
        .bind(*remittance.tenant_id.as_uuid())
        .bind(remittance.period.start())
        .bind(remittance.period.end())
        .bind(remittance.period.period_type().as_str())
        .bind(remittance.total_tax_collected.as_i64())
        .bind(remittance.total_tax_remitted.as_i64())
        .bind(remittance.status.as_str())
        .bind(remittance.method.as_str())
        .bind(remittance.remittance_date)
        .bind(&remittance.remittance_reference)
        .bind(json.report_data)
        .bind(&remittance.notes)
        .bind(json.transitions)
        .bind(json.corrections)
        .bind(remittance.created_at)
        .bind(remittance.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok((remittance, true))
    }

    async fn get_remittance(
        &self,
        id: RemittanceId,
    ) -> Result<Option<TaxRemittance>, StoreError> {
        let row = sqlx::query_as::<_, RemittanceRow>(&format!(
            "SELECT {REMITTANCE_COLUMNS} FROM tax_remittances WHERE id = $1"
        ))
        .bind(*id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(RemittanceRow::into_record).transpose()
    }

    async fn save_remittance(
        &self,
        remittance: &TaxRemittance,
        expected: RemittanceStatus,
    ) -> Result<bool, StoreError> {
        let updated = update_remittance(&self.pool, remittance, expected).await?;
        if updated {
            return Ok(true);
        }
        let exists: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM tax_remittances WHERE id = $1")
                .bind(*remittance.id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;
        match exists {
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
        let rows = sqlx::query_as::<_, RemittanceRow>(&format!(
            "SELECT {REMITTANCE_COLUMNS} FROM tax_remittances
             WHERE tenant_id = $1 ORDER BY period_start DESC LIMIT $2"
        ))
        .bind(*tenant_id.as_uuid())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(RemittanceRow::into_record).collect()
    }

    async fn list_by_status(
        &self,
        status: RemittanceStatus,
    ) -> Result<Vec<TaxRemittance>, StoreError> {
        let rows = sqlx::query_as::<_, RemittanceRow>(&format!(
            "SELECT {REMITTANCE_COLUMNS} FROM tax_remittances
             WHERE status = $1 ORDER BY updated_at"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(RemittanceRow::into_record).collect()
    }

    async fn remittances_overlapping(
        &self,
        tenant_id: TenantId,
        period: &RemittancePeriod,
    ) -> Result<Vec<TaxRemittance>, StoreError> {
        let rows = sqlx::query_as::<_, RemittanceRow>(&format!(
            "SELECT {REMITTANCE_COLUMNS} FROM tax_remittances
             WHERE tenant_id = $1 AND period_start <= $3 AND period_end >= $2
             ORDER BY period_start"
        ))
        .bind(*tenant_id.as_uuid())
        .bind(period.start())
        .bind(period.end())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(RemittanceRow::into_record).collect()
    }

    async fn payments_for_remittance(
        &self,
        remittance_id: RemittanceId,
    ) -> Result<Vec<TaxAchPayment>, StoreError> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM tax_ach_payments
             WHERE remittance_id = $1 ORDER BY created_at"
        ))
        .bind(*remittance_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(PaymentRow::into_record).collect()
    }

    async fn payment_by_external_id(
        &self,
        external_id: &ExternalPaymentId,
    ) -> Result<Option<TaxAchPayment>, StoreError> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM tax_ach_payments WHERE external_payment_id = $1"
        ))
        .bind(external_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(PaymentRow::into_record).transpose()
    }

    async fn record_initiation(
        &self,
        payment: &TaxAchPayment,
        remittance: &TaxRemittance,
        expected: RemittanceStatus,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM tax_remittances WHERE id = $1 FOR UPDATE")
                .bind(*remittance.id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(backend)?;
        match current.as_deref() {
            None => {
                return Err(StoreError::Conflict(format!(
                    "remittance {} does not exist",
                    remittance.id
                )))
            }
            Some(status) if status != expected.as_str() => {
                return Err(StoreError::Conflict(format!(
                    "remittance {} moved to {status} concurrently",
                    remittance.id
                )))
            }
            Some(_) => {}
        }

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tax_ach_payments WHERE remittance_id = $1 AND status <> 'failed'",
        )
        .bind(*remittance.id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(backend)?;
        if active > 0 {
            return Err(StoreError::Conflict(format!(
                "remittance {} already has an active payment",
                remittance.id
            )));
        }

        if !update_remittance(&mut *tx, remittance, expected).await? {
            return Err(StoreError::Conflict(format!(
                "remittance {} changed concurrently",
                remittance.id
            )));
        }
        insert_payment(&mut *tx, payment).await?;

        tx.commit().await.map_err(backend)
    }

    async fn apply_reconciliation(
        &self,
        payment: &TaxAchPayment,
        expected_payment: AchPaymentStatus,
        remittance: Option<(&TaxRemittance, RemittanceStatus)>,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let updated = sqlx::query(
            "UPDATE tax_ach_payments SET
               status = $2, confirmation_number = $3, error_message = $4,
               processed_at = $5, updated_at = $6
             WHERE id = $1 AND status = $7",
        )
        .bind(*payment.id.as_uuid())
        .bind(payment.status.as_str())
        .bind(&payment.confirmation_number)
        .bind(&payment.error_message)
        .bind(payment.processed_at)
        .bind(payment.updated_at)
        .bind(expected_payment.as_str())
        .execute(&mut *tx)
        .await
        .map_err(backend)?
        .rows_affected();
        if updated != 1 {
            tx.rollback().await.map_err(backend)?;
            return Ok(false);
        }

        if let Some((r, expected)) = remittance {
            if !update_remittance(&mut *tx, r, expected).await? {
                tx.rollback().await.map_err(backend)?;
                return Ok(false);
            }
        }

        tx.commit().await.map_err(backend)?;
        Ok(true)
    }
}

// ─── Statements ──────────────────────────────────────────────────────

async fn update_remittance<'c, E>(
    executor: E,
    remittance: &TaxRemittance,
    expected: RemittanceStatus,
) -> Result<bool, StoreError>
where
    E: PgExecutor<'c>,
{
    let json = RemittanceJson::of(remittance)?;
    let result = sqlx::query(
        "UPDATE tax_remittances SET
           total_tax_collected = $2, total_tax_remitted = $3, status = $4, method = $5,
           remittance_date = $6, remittance_reference = $7, report_data = $8, notes = $9,
           transitions = $10, corrections = $11, updated_at = $12
         WHERE id = $1 AND status = $13",
    )
    .bind(*remittance.id.as_uuid())
    .bind(remittance.total_tax_collected.as_i64())
    .bind(remittance.total_tax_remitted.as_i64())
    .bind(remittance.status.as_str())
    .bind(remittance.method.as_str())
    .bind(remittance.remittance_date)
    .bind(&remittance.remittance_reference)
    .bind(json.report_data)
    .bind(&remittance.notes)
    .bind(json.transitions)
    .bind(json.corrections)
    .bind(remittance.updated_at)
    .bind(expected.as_str())
    .execute(executor)
    .await
    .map_err(backend)?;
    Ok(result.rows_affected() == 1)
}

async fn insert_payment<'c, E>(executor: E, payment: &TaxAchPayment) -> Result<(), StoreError>
where
    E: PgExecutor<'c>,
{
    sqlx::query(&format!(
        "INSERT INTO tax_ach_payments ({PAYMENT_COLUMNS})
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)"
    ))
    .bind(*payment.id.as_uuid())
    .bind(*payment.tenant_id.as_uuid())
    .bind(*payment.remittance_id.as_uuid())
    .bind(payment.external_payment_id.as_ref().map(|e| e.as_str().to_string()))
    .bind(payment.recipient.recipient_type.as_str())
    .bind(&payment.recipient.name)
    .bind(payment.recipient.routing_number.as_str())
    .bind(payment.recipient.account_number.as_str())
    .bind(&payment.recipient.account_last4)
    .bind(payment.funding_account_id.as_str())
    .bind(payment.amount.as_i64())
    .bind(payment.status.as_str())
    .bind(&payment.confirmation_number)
    .bind(&payment.error_message)
    .bind(payment.processed_at)
    .bind(payment.created_at)
    .bind(payment.updated_at)
    .execute(executor)
    .await
    .map_err(backend)?;
    Ok(())
}

// ─── Rows ────────────────────────────────────────────────────────────

struct RemittanceJson {
    report_data: serde_json::Value,
    transitions: serde_json::Value,
    corrections: serde_json::Value,
}

impl RemittanceJson {
    fn of(r: &TaxRemittance) -> Result<Self, StoreError> {
        Ok(Self {
            report_data: serde_json::to_value(&r.report_data)
                .map_err(|e| corrupt("report_data", e))?,
            transitions: serde_json::to_value(&r.transitions)
                .map_err(|e| corrupt("transitions", e))?,
            corrections: serde_json::to_value(&r.corrections)
                .map_err(|e| corrupt("corrections", e))?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RemittanceRow {
    id: Uuid,
    tenant_id: Uuid,
    period_start: NaiveDate,
    period_end: NaiveDate,
    period_type: String,
    total_tax_collected: i64,
    total_tax_remitted: i64,
    status: String,
    method: String,
    remittance_date: Option<DateTime<Utc>>,
    remittance_reference: Option<String>,
    report_data: serde_json::Value,
    notes: Option<String>,
    transitions: serde_json::Value,
    corrections: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RemittanceRow {
    fn into_record(self) -> Result<TaxRemittance, StoreError> {
        let period_type: PeriodType = self
            .period_type
            .parse()
            .map_err(|e| corrupt("period_type", e))?;
        let period = RemittancePeriod::with_type(self.period_start, self.period_end, period_type)
            .map_err(|e| corrupt("period", e))?;
        let status = RemittanceStatus::parse(&self.status)
            .ok_or_else(|| corrupt("remittance status", &self.status))?;
        let method = RemittanceMethod::parse(&self.method)
            .ok_or_else(|| corrupt("remittance method", &self.method))?;

        Ok(TaxRemittance {
            id: RemittanceId::from_uuid(self.id),
            tenant_id: TenantId::from_uuid(self.tenant_id),
            period,
            total_tax_collected: Cents::new(self.total_tax_collected),
            total_tax_remitted: Cents::new(self.total_tax_remitted),
            status,
            method,
            remittance_date: self.remittance_date,
            remittance_reference: self.remittance_reference,
            report_data: serde_json::from_value(self.report_data)
                .map_err(|e| corrupt("report_data", e))?,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
            transitions: serde_json::from_value(self.transitions)
                .map_err(|e| corrupt("transitions", e))?,
            corrections: serde_json::from_value(self.corrections)
                .map_err(|e| corrupt("corrections", e))?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    tenant_id: Uuid,
    remittance_id: Uuid,
    external_payment_id: Option<String>,
    recipient_type: String,
    recipient_name: String,
    routing_number: String,
    account_number: String,
    account_last4: String,
    funding_account_id: String,
    amount: i64,
    status: String,
    confirmation_number: Option<String>,
    error_message: Option<String>,
    processed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PaymentRow {
    fn into_record(self) -> Result<TaxAchPayment, StoreError> {
        let recipient_type: RecipientType = self
            .recipient_type
            .parse()
            .map_err(|e| corrupt("recipient_type", e))?;
        let status = AchPaymentStatus::from_gateway(&self.status)
            .ok_or_else(|| corrupt("payment status", &self.status))?;
        let external_payment_id = self
            .external_payment_id
            .map(ExternalPaymentId::new)
            .transpose()
            .map_err(|e| corrupt("external_payment_id", e))?;

        Ok(TaxAchPayment {
            id: AchPaymentId::from_uuid(self.id),
            tenant_id: TenantId::from_uuid(self.tenant_id),
            remittance_id: RemittanceId::from_uuid(self.remittance_id),
            external_payment_id,
            recipient: SealedRecipient {
                recipient_type,
                name: self.recipient_name,
                routing_number: SealedSecret::from_stored(self.routing_number),
                account_number: SealedSecret::from_stored(self.account_number),
                account_last4: self.account_last4,
            },
            funding_account_id: ExternalAccountId::new(self.funding_account_id)
                .map_err(|e| corrupt("funding_account_id", e))?,
            amount: Cents::new(self.amount),
            status,
            confirmation_number: self.confirmation_number,
            error_message: self.error_message,
            processed_at: self.processed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
