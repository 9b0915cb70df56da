//! # Remittance Record Manager
//!
//! Owns `TaxRemittance` rows. Creation is idempotent per tenant and period;
//! every later change runs under the remittance's lock and is written back
//! with a compare-and-swap on the status that was read.
//!
//! Manual attestation and ACH initiation are separate operations. The ACH
//! path lives in [`reconcile`](crate::reconcile).

use std::sync::Arc;

use serde::Serialize;

use remit_core::{Cents, RemittanceId, RemittancePeriod, TenantId};
use remit_state::{RemittanceError, RemittanceMethod, TaxRemittance};

use crate::aggregate::RemittanceAggregator;
use crate::audit::{emit, AuditEvent, AuditSink};
use crate::error::{EngineError, StoreError};
use crate::locks::RemittanceLocks;
use crate::store::{OrderSource, RemittanceStore};

/// History length when the caller gives none.
pub const DEFAULT_HISTORY_LIMIT: usize = 12;

/// Remittance note when the gateway reports a failure without a reason.
pub const DEFAULT_FAILURE_REASON: &str = "ACH payment failed";

/// How the transfer behind a `processing` remittance ended.
///
/// Both the manager and the reconciliation cascade settle remittances
/// through [`Settlement::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement<'a> {
    Completed { reference: Option<&'a str> },
    Failed { reason: Option<&'a str> },
}

impl Settlement<'_> {
    /// Audit event name for an applied settlement.
    pub fn event(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "remittance.completed",
            Self::Failed { .. } => "remittance.failed",
        }
    }

    /// `Ok(false)` when the remittance was already settled this way.
    pub fn apply(self, remittance: &mut TaxRemittance) -> Result<bool, RemittanceError> {
        match self {
            Self::Completed { reference } => remittance.mark_completed(reference),
            Self::Failed { reason } => remittance.mark_failed(
                reason
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .unwrap_or(DEFAULT_FAILURE_REASON),
            ),
        }
    }
}

/// Result of [`RemittanceManager::create`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateOutcome {
    pub remittance: TaxRemittance,
    /// `false` when an overlapping remittance already existed.
    pub created: bool,
}

#[derive(Clone)]
pub struct RemittanceManager {
    store: Arc<dyn RemittanceStore>,
    aggregator: RemittanceAggregator,
    audit: Arc<dyn AuditSink>,
    locks: RemittanceLocks,
}

impl RemittanceManager {
    pub fn new(
        store: Arc<dyn RemittanceStore>,
        orders: Arc<dyn OrderSource>,
        audit: Arc<dyn AuditSink>,
        locks: RemittanceLocks,
    ) -> Self {
        Self {
            store,
            aggregator: RemittanceAggregator::new(orders),
            audit,
            locks,
        }
    }

    pub fn aggregator(&self) -> &RemittanceAggregator {
        &self.aggregator
    }

    /// Create the remittance for `period`, or return the one that already
    /// covers an overlapping period.
    pub async fn create(
        &self,
        tenant_id: TenantId,
        period: RemittancePeriod,
        method: RemittanceMethod,
    ) -> Result<CreateOutcome, EngineError> {
        if let Some(existing) = self
            .store
            .remittances_overlapping(tenant_id, &period)
            .await?
            .into_iter()
            .next()
        {
            return Ok(CreateOutcome {
                remittance: existing,
                created: false,
            });
        }

        let summary = self.aggregator.aggregate(tenant_id, &period).await?;
        let candidate = TaxRemittance::new(
            tenant_id,
            period,
            method,
            summary.total_tax_collected,
            summary.report_data(),
        );
        let (remittance, created) = self.store.insert_remittance_if_absent(candidate).await?;

        if created {
            tracing::info!(
                tenant_id = %tenant_id,
                remittance_id = %remittance.id,
                period = %remittance.period,
                total = %remittance.total_tax_collected,
                "remittance created"
            );
            self.audit_change(&remittance, "remittance.created", None).await;
        }
        Ok(CreateOutcome {
            remittance,
            created,
        })
    }

    pub async fn get(&self, id: RemittanceId) -> Result<TaxRemittance, EngineError> {
        self.store
            .get_remittance(id)
            .await?
            .ok_or_else(|| EngineError::not_found(id))
    }

    /// Like [`get`](Self::get), but another tenant's remittance is not found.
    pub async fn get_for_tenant(
        &self,
        tenant_id: TenantId,
        id: RemittanceId,
    ) -> Result<TaxRemittance, EngineError> {
        let remittance = self.get(id).await?;
        if remittance.tenant_id != tenant_id {
            return Err(EngineError::not_found(id));
        }
        Ok(remittance)
    }

    /// Most recent periods first.
    pub async fn history(
        &self,
        tenant_id: TenantId,
        limit: Option<usize>,
    ) -> Result<Vec<TaxRemittance>, EngineError> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        Ok(self.store.list_remittances(tenant_id, limit).await?)
    }

    /// Operator attests the obligation was paid outside the ACH rail.
    pub async fn attest_manual(
        &self,
        tenant_id: TenantId,
        id: RemittanceId,
        reference: &str,
    ) -> Result<TaxRemittance, EngineError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(EngineError::Validation(
                "remittance reference must not be empty".into(),
            ));
        }
        self.mutate(id, Some(tenant_id), "remittance.attested", |r| {
            r.attest_manual(reference).map(|()| true)
        })
        .await
        .map_err(|e| match e {
            EngineError::Transition(RemittanceError::AlreadyProcessed) => {
                EngineError::AlreadyProcessed(id)
            }
            other => other,
        })
    }

    /// `processing` → `completed`. Repeats are no-ops.
    pub async fn mark_completed(
        &self,
        id: RemittanceId,
        reference: Option<&str>,
    ) -> Result<TaxRemittance, EngineError> {
        self.settle(id, Settlement::Completed { reference }).await
    }

    /// `processing` → `failed`. Repeats are no-ops.
    pub async fn mark_failed(
        &self,
        id: RemittanceId,
        reason: &str,
    ) -> Result<TaxRemittance, EngineError> {
        self.settle(id, Settlement::Failed { reason: Some(reason) })
            .await
    }

    async fn settle(
        &self,
        id: RemittanceId,
        settlement: Settlement<'_>,
    ) -> Result<TaxRemittance, EngineError> {
        self.mutate(id, None, settlement.event(), |r| settlement.apply(r))
            .await
    }

    /// Raise the remitted total of a completed remittance.
    pub async fn record_correction(
        &self,
        tenant_id: TenantId,
        id: RemittanceId,
        new_remitted: Cents,
        note: &str,
    ) -> Result<TaxRemittance, EngineError> {
        if new_remitted.is_negative() {
            return Err(EngineError::Validation(
                "corrected remitted total must not be negative".into(),
            ));
        }
        self.mutate(id, Some(tenant_id), "remittance.corrected", |r| {
            r.record_correction(new_remitted, note).map(|()| true)
        })
        .await
    }

    /// Load, apply `change` and save under the remittance lock.
    ///
    /// `change` returns `false` for a no-op, in which case nothing is written.
    async fn mutate<F>(
        &self,
        id: RemittanceId,
        tenant_id: Option<TenantId>,
        event: &str,
        change: F,
    ) -> Result<TaxRemittance, EngineError>
    where
        F: FnOnce(&mut TaxRemittance) -> Result<bool, RemittanceError>,
    {
        let _guard = self.locks.lock(id).await;
        let mut remittance = match tenant_id {
            Some(tenant_id) => self.get_for_tenant(tenant_id, id).await?,
            None => self.get(id).await?,
        };
        let prior = remittance.status;

        if !change(&mut remittance)? {
            tracing::debug!(
                remittance_id = %id,
                status = %prior,
                event,
                "remittance already in target state"
            );
            return Ok(remittance);
        }
        if !self.store.save_remittance(&remittance, prior).await? {
            return Err(StoreError::Conflict(format!(
                "remittance {id} changed while {event} was applied"
            ))
            .into());
        }

        tracing::info!(
            tenant_id = %remittance.tenant_id,
            remittance_id = %id,
            from = %prior,
            to = %remittance.status,
            event,
            "remittance updated"
        );
        self.audit_change(&remittance, event, Some(prior)).await;
        Ok(remittance)
    }

    pub(crate) async fn audit_change(
        &self,
        remittance: &TaxRemittance,
        event: &str,
        prior: Option<remit_state::RemittanceStatus>,
    ) {
        emit(
            self.audit.as_ref(),
            remittance_event(remittance, event, prior),
        )
        .await;
    }
}

/// Audit record for a remittance change.
pub(crate) fn remittance_event(
    remittance: &TaxRemittance,
    event: &str,
    prior: Option<remit_state::RemittanceStatus>,
) -> AuditEvent {
    AuditEvent::new(
        remittance.tenant_id,
        event,
        Some(remittance.id.to_string()),
        serde_json::json!({
            "from": prior.map(|s| s.as_str()),
            "status": remittance.status.as_str(),
            "method": remittance.method.as_str(),
            "period": remittance.period.to_string(),
            "total_tax_collected": remittance.total_tax_collected,
            "total_tax_remitted": remittance.total_tax_remitted,
            "reference": remittance.remittance_reference,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::model::OrderRecord;
    use crate::store::{MemoryOrderSource, MemoryRemittanceStore};
    use chrono::{TimeZone, Utc};
    use remit_core::OrderId;
    use remit_state::RemittanceStatus;

    struct Fixture {
        manager: RemittanceManager,
        store: Arc<MemoryRemittanceStore>,
        audit: Arc<MemoryAuditSink>,
        tenant: TenantId,
    }

    fn fixture() -> Fixture {
        let tenant = TenantId::new();
        let orders = Arc::new(MemoryOrderSource::new());
        orders.insert_order(OrderRecord {
            id: OrderId::new(),
            tenant_id: tenant,
            tax_amount: Cents::new(50_000),
            total_amount: Cents::new(600_000),
            status: "completed".into(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap(),
            jurisdiction: Some("TX".into()),
        });
        let store = Arc::new(MemoryRemittanceStore::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let manager = RemittanceManager::new(
            store.clone(),
            orders,
            audit.clone(),
            RemittanceLocks::new(),
        );
        Fixture {
            manager,
            store,
            audit,
            tenant,
        }
    }

    fn january() -> RemittancePeriod {
        RemittancePeriod::monthly(2024, 1).unwrap()
    }

    // ── create ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn create_is_idempotent() {
        let f = fixture();
        let first = f
            .manager
            .create(f.tenant, january(), RemittanceMethod::Manual)
            .await
            .unwrap();
        assert!(first.created);
        assert_eq!(first.remittance.total_tax_collected, Cents::new(50_000));
        assert_eq!(first.remittance.report_data.order_count, 1);

        let second = f
            .manager
            .create(f.tenant, january(), RemittanceMethod::Automatic)
            .await
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.remittance.id, first.remittance.id);
        assert_eq!(f.audit.names(), vec!["remittance.created"]);
    }

    // ── manual path ──────────────────────────────────────────────────

    #[tokio::test]
    async fn attestation_completes_once() {
        let f = fixture();
        let r = f
            .manager
            .create(f.tenant, january(), RemittanceMethod::Manual)
            .await
            .unwrap()
            .remittance;

        let done = f.manager.attest_manual(f.tenant, r.id, "CHK-7").await.unwrap();
        assert_eq!(done.status, RemittanceStatus::Completed);
        assert_eq!(done.total_tax_remitted, Cents::new(50_000));

        let err = f
            .manager
            .attest_manual(f.tenant, r.id, "CHK-8")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::AlreadyProcessed(id) if id == r.id));
    }

    #[tokio::test]
    async fn other_tenants_cannot_see_remittance() {
        let f = fixture();
        let r = f
            .manager
            .create(f.tenant, january(), RemittanceMethod::Manual)
            .await
            .unwrap()
            .remittance;
        let err = f
            .manager
            .attest_manual(TenantId::new(), r.id, "X")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn correction_requires_completion() {
        let f = fixture();
        let r = f
            .manager
            .create(f.tenant, january(), RemittanceMethod::Manual)
            .await
            .unwrap()
            .remittance;
        let err = f
            .manager
            .record_correction(f.tenant, r.id, Cents::new(51_000), "penalty")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Transition(RemittanceError::InvalidCorrection(_))
        ));

        f.manager.attest_manual(f.tenant, r.id, "CHK-1").await.unwrap();
        let corrected = f
            .manager
            .record_correction(f.tenant, r.id, Cents::new(51_000), "penalty")
            .await
            .unwrap();
        assert_eq!(corrected.total_tax_remitted, Cents::new(51_000));
        assert_eq!(corrected.corrections.len(), 1);
    }

    // ── automatic cascade ────────────────────────────────────────────

    #[tokio::test]
    async fn mark_completed_requires_processing_and_repeats_are_noops() {
        let f = fixture();
        let r = f
            .manager
            .create(f.tenant, january(), RemittanceMethod::Automatic)
            .await
            .unwrap()
            .remittance;
        let err = f.manager.mark_completed(r.id, Some("C1")).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Transition(RemittanceError::InvalidTransition { .. })
        ));

        let mut processing = r.clone();
        processing.begin_automatic().unwrap();
        assert!(f
            .store
            .save_remittance(&processing, RemittanceStatus::Pending)
            .await
            .unwrap());

        let done = f.manager.mark_completed(r.id, Some("C1")).await.unwrap();
        assert_eq!(done.remittance_reference.as_deref(), Some("C1"));
        let again = f.manager.mark_completed(r.id, Some("C2")).await.unwrap();
        assert_eq!(again.remittance_reference.as_deref(), Some("C1"));
        assert_eq!(
            f.audit.names(),
            vec!["remittance.created", "remittance.completed"]
        );
    }

    #[tokio::test]
    async fn blank_failure_reason_gets_default_note() {
        let f = fixture();
        let mut r = f
            .manager
            .create(f.tenant, january(), RemittanceMethod::Automatic)
            .await
            .unwrap()
            .remittance;
        r.begin_automatic().unwrap();
        assert!(f
            .store
            .save_remittance(&r, RemittanceStatus::Pending)
            .await
            .unwrap());

        let failed = f.manager.mark_failed(r.id, "   ").await.unwrap();
        assert_eq!(failed.status, RemittanceStatus::Failed);
        assert_eq!(failed.notes.as_deref(), Some(DEFAULT_FAILURE_REASON));
        assert_eq!(failed.total_tax_remitted, Cents::ZERO);
        assert_eq!(f.audit.names().last().map(String::as_str), Some("remittance.failed"));
    }

    #[test]
    fn settlement_repeats_are_noops() {
        let mut r = TaxRemittance::new(
            TenantId::new(),
            january(),
            RemittanceMethod::Automatic,
            Cents::new(500),
            Default::default(),
        );
        r.begin_automatic().unwrap();
        let done = Settlement::Completed { reference: Some("C1") };
        assert!(done.apply(&mut r).unwrap());
        assert!(!done.apply(&mut r).unwrap());
        assert_eq!(r.total_tax_remitted, Cents::new(500));
    }

    #[tokio::test]
    async fn history_defaults_to_twelve() {
        let f = fixture();
        for month in 1..=12 {
            f.manager
                .create(
                    f.tenant,
                    RemittancePeriod::monthly(2023, month).unwrap(),
                    RemittanceMethod::Manual,
                )
                .await
                .unwrap();
        }
        f.manager
            .create(f.tenant, january(), RemittanceMethod::Manual)
            .await
            .unwrap();
        let history = f.manager.history(f.tenant, None).await.unwrap();
        assert_eq!(history.len(), 12);
        assert_eq!(history[0].period, january());
    }
}
