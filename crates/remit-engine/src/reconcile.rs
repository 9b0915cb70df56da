//! # ACH Reconciliation
//!
//! Links funding accounts, initiates ACH transfers for remittances, and
//! applies gateway status reports. Polls, webhooks and the sweep all funnel
//! into [`AchReconciler::reconcile`].
//!
//! ## Atomicity
//!
//! Initiation and reconciliation hold the remittance's lock from first read
//! to final write. The final write is a single conditional store operation
//! covering both the payment and the remittance, keyed on the statuses read
//! under the lock. A duplicate or concurrent report therefore cascades at
//! most once.
//!
//! ## Failure semantics
//!
//! `create_payment` is never retried. If the gateway call fails the
//! remittance is untouched. If the gateway accepted the transfer but
//! recording it fails, the transfer exists without a local record; this is
//! logged at `error` with the external id for an operator.

use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use serde::Serialize;
use zeroize::Zeroizing;

use remit_core::sealed::last4;
use remit_core::{ExternalPaymentId, RemittanceId, TenantId};
use remit_crypto::AccountSealer;
use remit_gateway::{AchGateway, CreatePaymentRequest, LinkBankAccountRequest};
use remit_state::{
    AchPaymentStatus, PaymentReport, RemittanceStatus, ReportEffect, SealedRecipient,
    TaxAchPayment, TaxRemittance,
};

use crate::audit::{emit, AuditEvent, AuditSink};
use crate::error::{EngineError, StoreError};
use crate::locks::RemittanceLocks;
use crate::model::{LinkedBankAccount, RecipientDetails};
use crate::remittance::{remittance_event, Settlement};
use crate::store::{RemittanceStore, TenantDirectory};

/// Business days are not modelled; ACH settles in about three days.
const EXPECTED_SETTLEMENT_DAYS: u64 = 3;


/// Result of [`AchReconciler::initiate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitiatedPayment {
    pub payment: TaxAchPayment,
    pub remittance: TaxRemittance,
    pub expected_completion: NaiveDate,
}

/// What a report did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// No local payment carries the external id.
    UnknownPayment,
    /// The payment is already at or past the reported status.
    Duplicate { status: AchPaymentStatus },
    /// Terminal payment reported with the opposite terminal status; ignored.
    Conflict {
        current: AchPaymentStatus,
        reported: AchPaymentStatus,
    },
    /// Still pending; details refreshed.
    Refreshed,
    Applied {
        from: AchPaymentStatus,
        to: AchPaymentStatus,
    },
}

/// Counters from one [`AchReconciler::sweep`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    /// Remittances found in `processing`.
    pub examined: usize,
    /// Stale pending payments polled.
    pub polled: usize,
    pub applied: usize,
    pub unchanged: usize,
    pub errors: usize,
}

pub struct AchReconciler {
    store: Arc<dyn RemittanceStore>,
    directory: Arc<dyn TenantDirectory>,
    gateway: Arc<dyn AchGateway>,
    sealer: Arc<AccountSealer>,
    audit: Arc<dyn AuditSink>,
    locks: RemittanceLocks,
}

impl AchReconciler {
    pub fn new(
        store: Arc<dyn RemittanceStore>,
        directory: Arc<dyn TenantDirectory>,
        gateway: Arc<dyn AchGateway>,
        sealer: Arc<AccountSealer>,
        audit: Arc<dyn AuditSink>,
        locks: RemittanceLocks,
    ) -> Self {
        Self {
            store,
            directory,
            gateway,
            sealer,
            audit,
            locks,
        }
    }

    pub fn gateway(&self) -> &Arc<dyn AchGateway> {
        &self.gateway
    }

    /// Payment recorded under the gateway's id, if any.
    pub async fn find_payment(
        &self,
        external_id: &ExternalPaymentId,
    ) -> Result<Option<TaxAchPayment>, EngineError> {
        Ok(self.store.payment_by_external_id(external_id).await?)
    }

    // ── Funding account ──────────────────────────────────────────────

    /// Link the tenant's funding account through the gateway and store it
    /// sealed. Replaces any previously linked account.
    pub async fn link_account(
        &self,
        tenant_id: TenantId,
        request: &LinkBankAccountRequest,
    ) -> Result<LinkedBankAccount, EngineError> {
        request.validate()?;
        let external_account_id = self.gateway.link_bank_account(request).await?;

        let account = LinkedBankAccount {
            tenant_id,
            external_account_id,
            account_type: request.account_type,
            holder_name: request.account_holder_name.trim().to_string(),
            routing_number: self.sealer.seal(request.routing_number.trim())?,
            account_number: self.sealer.seal(request.account_number.trim())?,
            account_last4: last4(&request.account_number),
            linked_at: Utc::now(),
        };
        self.directory.save_linked_account(&account).await?;

        tracing::info!(
            tenant_id = %tenant_id,
            external_account_id = %account.external_account_id,
            "funding account linked"
        );
        emit(
            self.audit.as_ref(),
            AuditEvent::new(
                tenant_id,
                "ach.account_linked",
                Some(account.external_account_id.to_string()),
                serde_json::json!({
                    "account_type": account.account_type.as_str(),
                    "account_last4": account.account_last4,
                }),
            ),
        )
        .await;
        Ok(account)
    }

    // ── Initiation ───────────────────────────────────────────────────

    /// Submit an ACH transfer of the remittance's outstanding balance.
    pub async fn initiate(
        &self,
        tenant_id: TenantId,
        remittance_id: RemittanceId,
        recipient: &RecipientDetails,
        memo: Option<&str>,
    ) -> Result<InitiatedPayment, EngineError> {
        validate_recipient(recipient)?;
        let _guard = self.locks.lock(remittance_id).await;

        let remittance = self
            .store
            .get_remittance(remittance_id)
            .await?
            .filter(|r| r.tenant_id == tenant_id)
            .ok_or_else(|| EngineError::not_found(remittance_id))?;
        match remittance.status {
            RemittanceStatus::Completed => {
                return Err(EngineError::AlreadyProcessed(remittance_id))
            }
            RemittanceStatus::Processing => {
                return Err(EngineError::PaymentInFlight(remittance_id))
            }
            RemittanceStatus::Pending | RemittanceStatus::Failed => {}
        }

        let account = self
            .directory
            .linked_account(tenant_id)
            .await?
            .ok_or(EngineError::NoLinkedAccount(tenant_id))?;

        let existing = self.store.payments_for_remittance(remittance_id).await?;
        if existing.iter().any(TaxAchPayment::is_active) {
            return Err(EngineError::PaymentInFlight(remittance_id));
        }

        let amount = remittance.amount_due();
        if !amount.is_positive() {
            return Err(EngineError::NothingToRemit(remittance_id));
        }

        let sealed = SealedRecipient {
            recipient_type: recipient.recipient_type,
            name: recipient.name.trim().to_string(),
            routing_number: self.sealer.seal(recipient.routing_number.trim())?,
            account_number: self.sealer.seal(recipient.account_number.trim())?,
            account_last4: last4(&recipient.account_number),
        };
        let memo = memo
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!(
                    "Tax remittance for period {} - {}",
                    remittance.period.start(),
                    remittance.period.end()
                )
            });
        let request = CreatePaymentRequest {
            amount,
            recipient_name: sealed.name.clone(),
            recipient_type: recipient.recipient_type,
            routing_number: Zeroizing::new(recipient.routing_number.trim().to_string()),
            account_number: Zeroizing::new(recipient.account_number.trim().to_string()),
            memo,
            source_account_id: account.external_account_id.clone(),
        };

        let created = self.gateway.create_payment(&request).await.map_err(|e| {
            tracing::warn!(
                tenant_id = %tenant_id,
                remittance_id = %remittance_id,
                error = %e,
                "ACH payment creation failed"
            );
            EngineError::from(e)
        })?;

        let prior = remittance.status;
        let mut updated = remittance;
        updated.begin_automatic()?;
        let payment = TaxAchPayment::submitted(
            tenant_id,
            remittance_id,
            created.external_payment_id.clone(),
            sealed,
            account.external_account_id,
            amount,
        );

        if let Err(e) = self.store.record_initiation(&payment, &updated, prior).await {
            tracing::error!(
                tenant_id = %tenant_id,
                remittance_id = %remittance_id,
                external_payment_id = %created.external_payment_id,
                error = %e,
                "ACH payment was accepted by the gateway but could not be recorded"
            );
            return Err(e.into());
        }

        tracing::info!(
            tenant_id = %tenant_id,
            remittance_id = %remittance_id,
            external_payment_id = %created.external_payment_id,
            amount = %amount,
            "ACH payment initiated"
        );
        emit(self.audit.as_ref(), payment_event(&payment, "ach.payment_created")).await;
        emit(
            self.audit.as_ref(),
            remittance_event(&updated, "remittance.processing", Some(prior)),
        )
        .await;

        let mut result = InitiatedPayment {
            payment,
            remittance: updated,
            expected_completion: Utc::now().date_naive() + Days::new(EXPECTED_SETTLEMENT_DAYS),
        };

        // Some gateways settle synchronously; apply that like any later report.
        if created.status.is_terminal() {
            let report = PaymentReport {
                status: created.status,
                confirmation_number: None,
                error_message: None,
                processed_at: None,
            };
            self.reconcile_locked(&created.external_payment_id, &report)
                .await?;
            if let Some(p) = self
                .store
                .payment_by_external_id(&created.external_payment_id)
                .await?
            {
                result.payment = p;
            }
            if let Some(r) = self.store.get_remittance(remittance_id).await? {
                result.remittance = r;
            }
        }
        Ok(result)
    }

    // ── Reconciliation ───────────────────────────────────────────────

    /// Apply a gateway report for `external_id`.
    ///
    /// Unknown ids are acknowledged without error or mutation.
    pub async fn reconcile(
        &self,
        external_id: &ExternalPaymentId,
        report: &PaymentReport,
    ) -> Result<ReconcileOutcome, EngineError> {
        let Some(found) = self.store.payment_by_external_id(external_id).await? else {
            tracing::info!(
                external_payment_id = %external_id,
                status = report.status.as_str(),
                "report for unknown ACH payment ignored"
            );
            return Ok(ReconcileOutcome::UnknownPayment);
        };
        let _guard = self.locks.lock(found.remittance_id).await;
        self.reconcile_locked(external_id, report).await
    }

    /// Body of [`reconcile`](Self::reconcile); the caller holds the lock.
    async fn reconcile_locked(
        &self,
        external_id: &ExternalPaymentId,
        report: &PaymentReport,
    ) -> Result<ReconcileOutcome, EngineError> {
        let Some(mut payment) = self.store.payment_by_external_id(external_id).await? else {
            return Ok(ReconcileOutcome::UnknownPayment);
        };
        let prior = payment.status;

        match payment.apply_report(report) {
            ReportEffect::Duplicate => {
                tracing::debug!(
                    external_payment_id = %external_id,
                    status = prior.as_str(),
                    "duplicate ACH report"
                );
                Ok(ReconcileOutcome::Duplicate { status: prior })
            }
            ReportEffect::Conflict { current, reported } => {
                tracing::warn!(
                    external_payment_id = %external_id,
                    current = current.as_str(),
                    reported = reported.as_str(),
                    "conflicting terminal ACH report ignored"
                );
                Ok(ReconcileOutcome::Conflict { current, reported })
            }
            ReportEffect::Refreshed => {
                self.write(&payment, prior, None).await?;
                Ok(ReconcileOutcome::Refreshed)
            }
            ReportEffect::Applied { from, to } => {
                let mut remittance = self
                    .store
                    .get_remittance(payment.remittance_id)
                    .await?
                    .ok_or_else(|| EngineError::not_found(payment.remittance_id))?;
                let remittance_prior = remittance.status;

                let settlement = match to {
                    AchPaymentStatus::Completed => Some(Settlement::Completed {
                        reference: report.confirmation_number.as_deref(),
                    }),
                    AchPaymentStatus::Failed => Some(Settlement::Failed {
                        reason: report.error_message.as_deref(),
                    }),
                    AchPaymentStatus::Pending => None,
                };
                let transition = match settlement {
                    Some(settlement) => settlement.apply(&mut remittance),
                    None => Ok(false),
                };
                let cascade = match transition {
                    Ok(changed) => changed,
                    Err(e) => {
                        // e.g. attested manually while the transfer was in flight
                        tracing::warn!(
                            remittance_id = %remittance.id,
                            external_payment_id = %external_id,
                            error = %e,
                            "payment updated without remittance transition"
                        );
                        false
                    }
                };

                self.write(
                    &payment,
                    prior,
                    cascade.then_some((&remittance, remittance_prior)),
                )
                .await?;

                tracing::info!(
                    tenant_id = %payment.tenant_id,
                    remittance_id = %payment.remittance_id,
                    external_payment_id = %external_id,
                    from = from.as_str(),
                    to = to.as_str(),
                    "ACH payment reconciled"
                );
                emit(self.audit.as_ref(), payment_event(&payment, "ach.payment_updated")).await;
                if let Some(settlement) = settlement.filter(|_| cascade) {
                    emit(
                        self.audit.as_ref(),
                        remittance_event(&remittance, settlement.event(), Some(remittance_prior)),
                    )
                    .await;
                }
                Ok(ReconcileOutcome::Applied { from, to })
            }
        }
    }

    async fn write(
        &self,
        payment: &TaxAchPayment,
        expected: AchPaymentStatus,
        remittance: Option<(&TaxRemittance, RemittanceStatus)>,
    ) -> Result<(), EngineError> {
        if self
            .store
            .apply_reconciliation(payment, expected, remittance)
            .await?
        {
            Ok(())
        } else {
            Err(StoreError::Conflict(format!(
                "ACH payment {} changed during reconciliation",
                payment.id
            ))
            .into())
        }
    }

    /// Ask the gateway for the current status and reconcile it.
    pub async fn poll(
        &self,
        external_id: &ExternalPaymentId,
    ) -> Result<ReconcileOutcome, EngineError> {
        match self.gateway.get_payment_status(external_id).await? {
            Some(report) => self.reconcile(external_id, &report).await,
            None => Err(EngineError::not_found(format!(
                "ACH payment {external_id} at gateway"
            ))),
        }
    }

    /// Poll every pending payment of a `processing` remittance that has not
    /// changed for `stale_after`.
    pub async fn sweep(&self, stale_after: chrono::Duration) -> Result<SweepSummary, EngineError> {
        let cutoff = Utc::now() - stale_after;
        let processing = self
            .store
            .list_by_status(RemittanceStatus::Processing)
            .await?;
        let mut summary = SweepSummary {
            examined: processing.len(),
            ..SweepSummary::default()
        };

        for remittance in processing {
            let payments = self.store.payments_for_remittance(remittance.id).await?;
            for payment in payments
                .into_iter()
                .filter(|p| p.status == AchPaymentStatus::Pending && p.updated_at <= cutoff)
            {
                let Some(external_id) = payment.external_payment_id else {
                    continue;
                };
                summary.polled += 1;
                match self.poll(&external_id).await {
                    Ok(ReconcileOutcome::Applied { .. }) => summary.applied += 1,
                    Ok(_) => summary.unchanged += 1,
                    Err(e) => {
                        summary.errors += 1;
                        tracing::warn!(
                            remittance_id = %remittance.id,
                            external_payment_id = %external_id,
                            error = %e,
                            "sweep poll failed"
                        );
                    }
                }
            }
        }

        tracing::info!(
            examined = summary.examined,
            polled = summary.polled,
            applied = summary.applied,
            errors = summary.errors,
            "reconciliation sweep finished"
        );
        Ok(summary)
    }
}

fn validate_recipient(recipient: &RecipientDetails) -> Result<(), EngineError> {
    if recipient.name.trim().is_empty() {
        return Err(EngineError::InvalidBankDetails(
            "recipient name is required".into(),
        ));
    }
    let routing = recipient.routing_number.trim();
    if routing.len() != 9 || !routing.chars().all(|c| c.is_ascii_digit()) {
        return Err(EngineError::InvalidBankDetails(
            "recipient routing number must be 9 digits".into(),
        ));
    }
    let account = recipient.account_number.trim();
    if !(4..=17).contains(&account.len()) || !account.chars().all(|c| c.is_ascii_digit()) {
        return Err(EngineError::InvalidBankDetails(
            "recipient account number must be 4-17 digits".into(),
        ));
    }
    Ok(())
}

fn payment_event(payment: &TaxAchPayment, event: &str) -> AuditEvent {
    AuditEvent::new(
        payment.tenant_id,
        event,
        Some(payment.id.to_string()),
        serde_json::json!({
            "remittance_id": payment.remittance_id.to_string(),
            "external_payment_id": payment.external_payment_id.as_ref().map(|e| e.as_str()),
            "status": payment.status.as_str(),
            "amount": payment.amount,
            "recipient": payment.recipient.name,
            "recipient_last4": payment.recipient.account_last4,
            "confirmation_number": payment.confirmation_number,
            "error_message": payment.error_message,
        }),
    )
}
