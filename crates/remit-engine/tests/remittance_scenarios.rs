//! # End-to-end remittance scenarios
//!
//! Quote, aggregate, initiate and reconcile against in-memory stores and
//! the mock ACH gateway.

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use remit_core::{Cents, ExternalPaymentId, OrderId, RemittancePeriod, TaxRate, TenantId};
use remit_crypto::AccountSealer;
use remit_engine::{
    AchReconciler, MemoryAuditSink, MemoryOrderSource, MemoryRemittanceStore,
    MemoryTenantDirectory, OrderRecord, QuoteItem, QuoteRequest, QuoteService, ReconcileOutcome,
    RecipientDetails, RemittanceLocks, RemittanceManager, RemittanceStore, TaxProvider,
    TenantTaxSettings, UnimplementedProvider,
};
use remit_gateway::{BankAccountType, LinkBankAccountRequest, MockAchGateway};
use remit_state::{
    AchPaymentStatus, PaymentReport, RecipientType, RemittanceMethod, RemittanceStatus,
};
use zeroize::Zeroizing;

struct Harness {
    tenant: TenantId,
    orders: Arc<MemoryOrderSource>,
    store: Arc<MemoryRemittanceStore>,
    audit: Arc<MemoryAuditSink>,
    gateway: Arc<MockAchGateway>,
    manager: RemittanceManager,
    reconciler: AchReconciler,
}

fn harness() -> Harness {
    let tenant = TenantId::new();
    let orders = Arc::new(MemoryOrderSource::new());
    let store = Arc::new(MemoryRemittanceStore::new());
    let directory = Arc::new(MemoryTenantDirectory::new());
    let audit = Arc::new(MemoryAuditSink::new());
    let gateway = Arc::new(MockAchGateway::new());
    let locks = RemittanceLocks::new();
    directory.upsert_settings(TenantTaxSettings::new(tenant));

    let manager = RemittanceManager::new(store.clone(), orders.clone(), audit.clone(), locks.clone());
    let reconciler = AchReconciler::new(
        store.clone(),
        directory,
        gateway.clone(),
        Arc::new(AccountSealer::ephemeral()),
        audit.clone(),
        locks,
    );
    Harness {
        tenant,
        orders,
        store,
        audit,
        gateway,
        manager,
        reconciler,
    }
}

fn order(tenant: TenantId, tax: &str, status: &str, jurisdiction: &str) -> OrderRecord {
    OrderRecord {
        id: OrderId::new(),
        tenant_id: tenant,
        tax_amount: Cents::parse(tax).unwrap(),
        total_amount: Cents::parse("100.00").unwrap(),
        status: status.into(),
        created_at: Utc.with_ymd_and_hms(2024, 1, 12, 15, 30, 0).unwrap(),
        jurisdiction: Some(jurisdiction.into()),
    }
}

fn recipient() -> RecipientDetails {
    RecipientDetails {
        recipient_type: RecipientType::State,
        name: "Texas Comptroller of Public Accounts".into(),
        routing_number: "111000614".into(),
        account_number: "1234567890".into(),
    }
}

fn report(status: AchPaymentStatus, confirmation: Option<&str>, error: Option<&str>) -> PaymentReport {
    PaymentReport {
        status,
        confirmation_number: confirmation.map(str::to_string),
        error_message: error.map(str::to_string),
        processed_at: None,
    }
}

/// A $500.00 January remittance with a linked account and an ACH payment in
/// flight. Returns the external payment id.
async fn processing_remittance(h: &Harness) -> (remit_core::RemittanceId, ExternalPaymentId) {
    h.orders.insert_order(order(h.tenant, "500.00", "completed", "TX"));
    let created = h
        .manager
        .create(
            h.tenant,
            RemittancePeriod::monthly(2024, 1).unwrap(),
            RemittanceMethod::Automatic,
        )
        .await
        .unwrap();
    h.reconciler
        .link_account(
            h.tenant,
            &LinkBankAccountRequest {
                routing_number: Zeroizing::new("121042882".into()),
                account_number: Zeroizing::new("000123456789".into()),
                account_type: BankAccountType::Checking,
                account_holder_name: "Taco Truck LLC".into(),
            },
        )
        .await
        .unwrap();
    let started = h
        .reconciler
        .initiate(h.tenant, created.remittance.id, &recipient(), None)
        .await
        .unwrap();
    (
        created.remittance.id,
        started.payment.external_payment_id.unwrap(),
    )
}

// -- Quotes -------------------------------------------------------------------

fn ten_dollar_order() -> QuoteRequest {
    QuoteRequest {
        items: vec![QuoteItem {
            id: "burrito".into(),
            quantity: 1,
            unit_price: Cents::parse("10.00").unwrap(),
            tax_code: None,
        }],
        subtotal: Cents::parse("10.00").unwrap(),
        ..QuoteRequest::default()
    }
}

#[tokio::test]
async fn test_scenario_a_builtin_quote() {
    let external: Arc<dyn TaxProvider> = Arc::new(UnimplementedProvider::new("unused"));
    let svc = QuoteService::new(external, Arc::new(MemoryAuditSink::new()));
    let mut settings = TenantTaxSettings::new(TenantId::new());
    settings.default_tax_rate = Some(TaxRate::parse("0.0825").unwrap());

    let quote = svc.get_quote(&settings, &ten_dollar_order()).await;
    assert_eq!(quote.amount.to_string(), "0.83");
    assert_eq!(quote.rate.to_string(), "0.0825");
    assert_eq!(quote.provider_used, "builtin");
    assert!(quote.warnings.is_empty());
}

#[tokio::test]
async fn test_scenario_b_external_without_key_falls_back() {
    let config = remit_gateway::TaxApiConfig::local_mock("http://127.0.0.1:9").unwrap();
    let external: Arc<dyn TaxProvider> =
        Arc::new(remit_engine::ExternalApiProvider::new(&config).unwrap());
    let audit = Arc::new(MemoryAuditSink::new());
    let svc = QuoteService::new(external, audit.clone());
    let mut settings = TenantTaxSettings::new(TenantId::new());
    settings.tax_provider = "external-api".into();

    let quote = svc.get_quote(&settings, &ten_dollar_order()).await;
    assert_eq!(quote.provider_used, "builtin");
    assert_eq!(quote.amount.to_string(), "0.83");
    assert_eq!(quote.warnings.len(), 1);
    assert!(quote.warnings[0].contains("missing TaxJar API key"));
    assert_eq!(audit.names(), vec!["quote.fallback"]);
}

// -- Aggregation --------------------------------------------------------------

#[tokio::test]
async fn test_scenario_c_aggregation_excludes_cancelled() {
    let h = harness();
    for (tax, status) in [
        ("12.50", "completed"),
        ("8.00", "completed"),
        ("2.60", "paid"),
        ("40.00", "cancelled"),
    ] {
        h.orders.insert_order(order(h.tenant, tax, status, "CA"));
    }
    let outcome = h
        .manager
        .create(
            h.tenant,
            RemittancePeriod::monthly(2024, 1).unwrap(),
            RemittanceMethod::Manual,
        )
        .await
        .unwrap();
    assert!(outcome.created);
    assert_eq!(outcome.remittance.total_tax_collected.to_string(), "23.10");
    assert_eq!(outcome.remittance.report_data.order_count, 3);
    assert_eq!(outcome.remittance.status, RemittanceStatus::Pending);
    assert_eq!(outcome.remittance.total_tax_remitted, Cents::ZERO);
}

#[tokio::test]
async fn test_create_twice_returns_same_remittance() {
    let h = harness();
    h.orders.insert_order(order(h.tenant, "1.00", "completed", "CA"));
    let period = RemittancePeriod::monthly(2024, 1).unwrap();
    let a = h
        .manager
        .create(h.tenant, period, RemittanceMethod::Manual)
        .await
        .unwrap();
    let b = h
        .manager
        .create(h.tenant, period, RemittanceMethod::Manual)
        .await
        .unwrap();
    assert_eq!(a.remittance.id, b.remittance.id);
    assert!(!b.created);
}

// -- ACH lifecycle ------------------------------------------------------------

#[tokio::test]
async fn test_scenario_d_initiate_moves_to_processing() {
    let h = harness();
    let (remittance_id, external_id) = processing_remittance(&h).await;

    let payment = h
        .store
        .payment_by_external_id(&external_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.amount.to_string(), "500.00");
    assert_eq!(payment.status, AchPaymentStatus::Pending);

    let remittance = h.store.get_remittance(remittance_id).await.unwrap().unwrap();
    assert_eq!(remittance.status, RemittanceStatus::Processing);
    assert_eq!(remittance.method, RemittanceMethod::Automatic);
    assert_eq!(remittance.total_tax_remitted, Cents::ZERO);
    assert_eq!(h.gateway.create_calls(), 1);
}

#[tokio::test]
async fn test_scenario_e_completed_webhook_settles_both() {
    let h = harness();
    let (remittance_id, external_id) = processing_remittance(&h).await;

    let outcome = h
        .reconciler
        .reconcile(
            &external_id,
            &report(AchPaymentStatus::Completed, Some("C1"), None),
        )
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Applied {
            from: AchPaymentStatus::Pending,
            to: AchPaymentStatus::Completed
        }
    );

    let payment = h
        .store
        .payment_by_external_id(&external_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, AchPaymentStatus::Completed);
    assert_eq!(payment.confirmation_number.as_deref(), Some("C1"));
    assert!(payment.processed_at.is_some());

    let remittance = h.store.get_remittance(remittance_id).await.unwrap().unwrap();
    assert_eq!(remittance.status, RemittanceStatus::Completed);
    assert_eq!(remittance.total_tax_remitted.to_string(), "500.00");
    assert_eq!(remittance.remittance_reference.as_deref(), Some("C1"));
    assert!(remittance.remittance_date.is_some());
    assert!(remittance.total_tax_remitted <= remittance.total_tax_collected);
}

#[tokio::test]
async fn test_scenario_f_failed_webhook_records_reason() {
    let h = harness();
    let (remittance_id, external_id) = processing_remittance(&h).await;

    h.reconciler
        .reconcile(
            &external_id,
            &report(AchPaymentStatus::Failed, None, Some("insufficient funds")),
        )
        .await
        .unwrap();

    let payment = h
        .store
        .payment_by_external_id(&external_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, AchPaymentStatus::Failed);
    assert_eq!(payment.error_message.as_deref(), Some("insufficient funds"));

    let remittance = h.store.get_remittance(remittance_id).await.unwrap().unwrap();
    assert_eq!(remittance.status, RemittanceStatus::Failed);
    assert!(remittance
        .notes
        .as_deref()
        .unwrap_or_default()
        .contains("insufficient funds"));
    assert_eq!(remittance.total_tax_remitted, Cents::ZERO);
}

// -- Idempotency --------------------------------------------------------------

#[tokio::test]
async fn test_duplicate_webhook_cascades_once() {
    let h = harness();
    let (remittance_id, external_id) = processing_remittance(&h).await;
    let completed = report(AchPaymentStatus::Completed, Some("C1"), None);

    let first = h.reconciler.reconcile(&external_id, &completed).await.unwrap();
    let second = h.reconciler.reconcile(&external_id, &completed).await.unwrap();
    assert!(matches!(first, ReconcileOutcome::Applied { .. }));
    assert_eq!(
        second,
        ReconcileOutcome::Duplicate {
            status: AchPaymentStatus::Completed
        }
    );

    let completions = h
        .audit
        .names()
        .into_iter()
        .filter(|n| n == "remittance.completed")
        .count();
    assert_eq!(completions, 1);
    let remittance = h.store.get_remittance(remittance_id).await.unwrap().unwrap();
    assert_eq!(remittance.transitions.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_webhooks_cascade_once() {
    let h = Arc::new(harness());
    let (remittance_id, external_id) = processing_remittance(&h).await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let h = h.clone();
        let id = external_id.clone();
        tasks.push(tokio::spawn(async move {
            h.reconciler
                .reconcile(&id, &report(AchPaymentStatus::Completed, Some("C1"), None))
                .await
                .unwrap()
        }));
    }
    let mut applied = 0;
    for task in tasks {
        if matches!(task.await.unwrap(), ReconcileOutcome::Applied { .. }) {
            applied += 1;
        }
    }
    assert_eq!(applied, 1);
    let remittance = h.store.get_remittance(remittance_id).await.unwrap().unwrap();
    assert_eq!(remittance.transitions.len(), 2);
}

#[tokio::test]
async fn test_unknown_payment_is_acknowledged_without_change() {
    let h = harness();
    let (remittance_id, _) = processing_remittance(&h).await;
    let before = h.store.get_remittance(remittance_id).await.unwrap().unwrap();

    let outcome = h
        .reconciler
        .reconcile(
            &ExternalPaymentId::new("nonexistent-id").unwrap(),
            &report(AchPaymentStatus::Completed, Some("C1"), None),
        )
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::UnknownPayment);
    let after = h.store.get_remittance(remittance_id).await.unwrap().unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_late_failure_after_completion_is_ignored() {
    let h = harness();
    let (remittance_id, external_id) = processing_remittance(&h).await;
    h.reconciler
        .reconcile(&external_id, &report(AchPaymentStatus::Completed, Some("C1"), None))
        .await
        .unwrap();
    let outcome = h
        .reconciler
        .reconcile(&external_id, &report(AchPaymentStatus::Failed, None, Some("late")))
        .await
        .unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Conflict { .. }));
    let remittance = h.store.get_remittance(remittance_id).await.unwrap().unwrap();
    assert_eq!(remittance.status, RemittanceStatus::Completed);
}

// -- Properties ---------------------------------------------------------------

fn status_strategy() -> impl proptest::strategy::Strategy<Value = AchPaymentStatus> {
    use proptest::prelude::*;
    prop_oneof![
        Just(AchPaymentStatus::Pending),
        Just(AchPaymentStatus::Completed),
        Just(AchPaymentStatus::Failed),
    ]
}

proptest::proptest! {
    #![proptest_config(proptest::prelude::ProptestConfig::with_cases(32))]

    /// Any sequence of gateway reports leaves the remittance either unpaid or
    /// paid in full, and settles it at most once.
    #[test]
    fn prop_report_sequences_settle_at_most_once(
        reports in proptest::collection::vec(status_strategy(), 1..8)
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let h = harness();
            let (remittance_id, external_id) = processing_remittance(&h).await;
            for status in reports {
                h.reconciler
                    .reconcile(&external_id, &report(status, Some("C1"), Some("declined")))
                    .await
                    .unwrap();
            }
            let r = h.store.get_remittance(remittance_id).await.unwrap().unwrap();
            assert!(r.total_tax_remitted <= r.total_tax_collected);
            assert!(r.total_tax_remitted.is_zero() || r.total_tax_remitted == r.total_tax_collected);
            let settled = h
                .audit
                .names()
                .into_iter()
                .filter(|n| n == "remittance.completed" || n == "remittance.failed")
                .count();
            assert!(settled <= 1);
        });
    }
}
