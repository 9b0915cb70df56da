//! Scheduled remittance runs.
//!
//! For every tenant that opted in, create last period's remittance and,
//! when a recipient and funding account are configured, pay it by ACH.
//! Failures are collected per tenant; one tenant never stops the run.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use remit_core::{RemittanceId, RemittancePeriod, TenantId};
use remit_state::{RemittanceMethod, RemittanceStatus};

use crate::error::EngineError;
use crate::model::TenantTaxSettings;
use crate::reconcile::AchReconciler;
use crate::remittance::RemittanceManager;
use crate::store::TenantDirectory;

/// Outcome of [`RemittanceScheduler::run_scheduled`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScheduleRun {
    pub created: Vec<RemittanceId>,
    pub initiated: Vec<RemittanceId>,
    /// Tenants with nothing to do: zero tax, or the period already handled.
    pub skipped: Vec<TenantId>,
    pub errors: Vec<(TenantId, String)>,
}

#[derive(Clone)]
pub struct RemittanceScheduler {
    directory: Arc<dyn TenantDirectory>,
    manager: RemittanceManager,
    reconciler: Arc<AchReconciler>,
}

impl RemittanceScheduler {
    pub fn new(
        directory: Arc<dyn TenantDirectory>,
        manager: RemittanceManager,
        reconciler: Arc<AchReconciler>,
    ) -> Self {
        Self {
            directory,
            manager,
            reconciler,
        }
    }

    pub async fn run_scheduled(&self, today: NaiveDate) -> Result<ScheduleRun, EngineError> {
        let tenants = self.directory.remittance_enabled_tenants().await?;
        let mut run = ScheduleRun::default();

        for settings in tenants {
            let tenant_id = settings.tenant_id;
            if let Err(e) = self.run_tenant(&settings, today, &mut run).await {
                tracing::warn!(tenant_id = %tenant_id, error = %e, "scheduled remittance failed");
                run.errors.push((tenant_id, e.to_string()));
            }
        }

        tracing::info!(
            created = run.created.len(),
            initiated = run.initiated.len(),
            skipped = run.skipped.len(),
            errors = run.errors.len(),
            "scheduled remittance run finished"
        );
        Ok(run)
    }

    async fn run_tenant(
        &self,
        settings: &TenantTaxSettings,
        today: NaiveDate,
        run: &mut ScheduleRun,
    ) -> Result<(), EngineError> {
        let tenant_id = settings.tenant_id;
        let period = RemittancePeriod::previous(settings.remittance_schedule, today)
            .map_err(|e| EngineError::Validation(e.to_string()))?;

        let summary = self.manager.aggregator().aggregate(tenant_id, &period).await?;
        if summary.total_tax_collected.is_zero() {
            run.skipped.push(tenant_id);
            return Ok(());
        }

        let recipient = settings.remittance_recipient.as_ref();
        let method = match recipient {
            Some(_) => RemittanceMethod::Automatic,
            None => RemittanceMethod::Manual,
        };
        let outcome = self.manager.create(tenant_id, period, method).await?;
        let remittance = outcome.remittance;
        if outcome.created {
            run.created.push(remittance.id);
        }

        // Failed attempts are retried by an operator, not by the schedule.
        let Some(recipient) = recipient.filter(|_| remittance.status == RemittanceStatus::Pending)
        else {
            if !outcome.created {
                run.skipped.push(tenant_id);
            }
            return Ok(());
        };
        if self.directory.linked_account(tenant_id).await?.is_none() {
            tracing::info!(
                tenant_id = %tenant_id,
                remittance_id = %remittance.id,
                "no linked funding account, leaving remittance for manual attestation"
            );
            if !outcome.created {
                run.skipped.push(tenant_id);
            }
            return Ok(());
        }

        self.reconciler
            .initiate(tenant_id, remittance.id, recipient, None)
            .await?;
        run.initiated.push(remittance.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::locks::RemittanceLocks;
    use crate::model::{OrderRecord, RecipientDetails};
    use crate::store::{
        MemoryOrderSource, MemoryRemittanceStore, MemoryTenantDirectory, RemittanceStore,
    };
    use chrono::{TimeZone, Utc};
    use remit_core::{Cents, OrderId};
    use remit_crypto::AccountSealer;
    use remit_gateway::{BankAccountType, LinkBankAccountRequest, MockAchGateway};
    use remit_state::RecipientType;
    use zeroize::Zeroizing;

    struct Fixture {
        scheduler: RemittanceScheduler,
        directory: Arc<MemoryTenantDirectory>,
        orders: Arc<MemoryOrderSource>,
        store: Arc<MemoryRemittanceStore>,
        reconciler: Arc<AchReconciler>,
    }

    fn fixture() -> Fixture {
        let directory = Arc::new(MemoryTenantDirectory::new());
        let orders = Arc::new(MemoryOrderSource::new());
        let store = Arc::new(MemoryRemittanceStore::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let locks = RemittanceLocks::new();
        let manager =
            RemittanceManager::new(store.clone(), orders.clone(), audit.clone(), locks.clone());
        let reconciler = Arc::new(AchReconciler::new(
            store.clone(),
            directory.clone(),
            Arc::new(MockAchGateway::new()),
            Arc::new(AccountSealer::ephemeral()),
            audit,
            locks,
        ));
        Fixture {
            scheduler: RemittanceScheduler::new(directory.clone(), manager, reconciler.clone()),
            directory,
            orders,
            store,
            reconciler,
        }
    }

    fn enabled_tenant(f: &Fixture, recipient: bool, tax: i64) -> TenantId {
        let mut settings = TenantTaxSettings::new(TenantId::new());
        settings.remittance_enabled = true;
        if recipient {
            settings.remittance_recipient = Some(RecipientDetails {
                recipient_type: RecipientType::State,
                name: "New York State Department of Taxation and Finance".into(),
                routing_number: "021000021".into(),
                account_number: "55501234".into(),
            });
        }
        let tenant = settings.tenant_id;
        f.directory.upsert_settings(settings);
        if tax > 0 {
            f.orders.insert_order(OrderRecord {
                id: OrderId::new(),
                tenant_id: tenant,
                tax_amount: Cents::new(tax),
                total_amount: Cents::new(tax * 12),
                status: "completed".into(),
                created_at: Utc.with_ymd_and_hms(2024, 1, 20, 10, 0, 0).unwrap(),
                jurisdiction: Some("NY".into()),
            });
        }
        tenant
    }

    fn february_first() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
    }

    #[tokio::test]
    async fn creates_and_initiates_previous_period() {
        let f = fixture();
        let manual = enabled_tenant(&f, false, 1_000);
        let automatic = enabled_tenant(&f, true, 2_000);
        let empty = enabled_tenant(&f, true, 0);
        f.reconciler
            .link_account(
                automatic,
                &LinkBankAccountRequest {
                    routing_number: Zeroizing::new("021000021".into()),
                    account_number: Zeroizing::new("99990000".into()),
                    account_type: BankAccountType::Checking,
                    account_holder_name: "Bagel Co".into(),
                },
            )
            .await
            .unwrap();

        let run = f.scheduler.run_scheduled(february_first()).await.unwrap();
        assert_eq!(run.created.len(), 2);
        assert_eq!(run.initiated.len(), 1);
        assert_eq!(run.skipped, vec![empty]);
        assert!(run.errors.is_empty());

        let manual_history = f.store.list_remittances(manual, 12).await.unwrap();
        assert_eq!(manual_history[0].status, RemittanceStatus::Pending);
        assert_eq!(
            manual_history[0].period,
            RemittancePeriod::monthly(2024, 1).unwrap()
        );
        let auto_history = f.store.list_remittances(automatic, 12).await.unwrap();
        assert_eq!(auto_history[0].status, RemittanceStatus::Processing);

        let again = f.scheduler.run_scheduled(february_first()).await.unwrap();
        assert!(again.created.is_empty());
        assert!(again.initiated.is_empty());
        assert_eq!(again.skipped.len(), 3);
    }

    #[tokio::test]
    async fn recipient_without_account_stays_pending() {
        let f = fixture();
        let tenant = enabled_tenant(&f, true, 1_000);
        let run = f.scheduler.run_scheduled(february_first()).await.unwrap();
        assert_eq!(run.created.len(), 1);
        assert!(run.initiated.is_empty());
        assert!(run.errors.is_empty());
        let history = f.store.list_remittances(tenant, 1).await.unwrap();
        assert_eq!(history[0].status, RemittanceStatus::Pending);
    }
}
