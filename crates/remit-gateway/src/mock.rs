//! In-process ACH gateway with deterministic identifiers.
//!
//! Used when no Remitian API key is configured and throughout the engine
//! tests. Payment ids are `mock_pay_000001`, `mock_pay_000002`, ... and
//! statuses only change when a test (or operator tooling) calls
//! [`MockAchGateway::settle`].

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use remit_core::{ExternalAccountId, ExternalPaymentId};
use remit_state::{AchPaymentStatus, PaymentReport};

use crate::ach::{
    fallback_recipients, AchGateway, CreatePaymentRequest, CreatedPayment, GovernmentRecipient,
    LinkBankAccountRequest, TaxType,
};
use crate::error::AchGatewayError;

#[derive(Debug, Default)]
struct MockState {
    next_payment: u64,
    next_account: u64,
    payments: HashMap<String, PaymentReport>,
    create_calls: u64,
    fail_next_create: Option<String>,
}

/// Deterministic [`AchGateway`] with scripted outcomes.
#[derive(Debug, Default)]
pub struct MockAchGateway {
    state: Mutex<MockState>,
}

impl MockAchGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `create_payment` fail as unavailable with `reason`.
    pub fn fail_next_create(&self, reason: &str) {
        self.state.lock().fail_next_create = Some(reason.to_string());
    }

    /// Number of `create_payment` calls received, failed ones included.
    pub fn create_calls(&self) -> u64 {
        self.state.lock().create_calls
    }

    /// Script the status the gateway reports for `id`.
    pub fn settle(&self, id: &ExternalPaymentId, report: PaymentReport) {
        self.state.lock().payments.insert(id.as_str().to_string(), report);
    }
}

#[async_trait]
impl AchGateway for MockAchGateway {
    async fn link_bank_account(
        &self,
        req: &LinkBankAccountRequest,
    ) -> Result<ExternalAccountId, AchGatewayError> {
        req.validate()?;
        let mut state = self.state.lock();
        state.next_account += 1;
        let id = format!("mock_acct_{:06}", state.next_account);
        ExternalAccountId::new(id).map_err(|e| AchGatewayError::InvalidBankDetails(e.to_string()))
    }

    async fn create_payment(
        &self,
        req: &CreatePaymentRequest,
    ) -> Result<CreatedPayment, AchGatewayError> {
        let mut state = self.state.lock();
        state.create_calls += 1;
        if let Some(reason) = state.fail_next_create.take() {
            return Err(AchGatewayError::Unavailable {
                endpoint: "POST /payments".to_string(),
                reason,
            });
        }
        if !req.amount.is_positive() {
            return Err(AchGatewayError::PaymentRejected {
                status: 422,
                body: "amount must be positive".to_string(),
            });
        }
        state.next_payment += 1;
        let raw = format!("mock_pay_{:06}", state.next_payment);
        state.payments.insert(
            raw.clone(),
            PaymentReport {
                status: AchPaymentStatus::Pending,
                confirmation_number: None,
                error_message: None,
                processed_at: None,
            },
        );
        let external_payment_id = ExternalPaymentId::new(raw).map_err(|e| {
            AchGatewayError::Deserialization {
                endpoint: "POST /payments".to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(CreatedPayment {
            external_payment_id,
            status: AchPaymentStatus::Pending,
        })
    }

    async fn get_payment_status(
        &self,
        id: &ExternalPaymentId,
    ) -> Result<Option<PaymentReport>, AchGatewayError> {
        Ok(self.state.lock().payments.get(id.as_str()).cloned())
    }

    async fn list_recipients(
        &self,
        state: &str,
        tax_type: TaxType,
    ) -> Result<Vec<GovernmentRecipient>, AchGatewayError> {
        Ok(fallback_recipients(state, tax_type))
    }

    fn invalidate_recipients(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use remit_core::Cents;
    use remit_state::RecipientType;
    use zeroize::Zeroizing;

    fn payment(amount: i64) -> CreatePaymentRequest {
        CreatePaymentRequest {
            amount: Cents::new(amount),
            recipient_name: "Texas Comptroller of Public Accounts".into(),
            recipient_type: RecipientType::State,
            routing_number: Zeroizing::new("111000614".into()),
            account_number: Zeroizing::new("1234567890".into()),
            memo: "test".into(),
            source_account_id: ExternalAccountId::new("mock_acct_000001").unwrap(),
        }
    }

    #[tokio::test]
    async fn ids_are_sequential_and_status_is_scripted() {
        let gw = MockAchGateway::new();
        let a = gw.create_payment(&payment(100)).await.unwrap();
        let b = gw.create_payment(&payment(100)).await.unwrap();
        assert_eq!(a.external_payment_id.as_str(), "mock_pay_000001");
        assert_eq!(b.external_payment_id.as_str(), "mock_pay_000002");

        let report = gw.get_payment_status(&a.external_payment_id).await.unwrap().unwrap();
        assert_eq!(report.status, AchPaymentStatus::Pending);

        gw.settle(
            &a.external_payment_id,
            PaymentReport {
                status: AchPaymentStatus::Completed,
                confirmation_number: Some("C1".into()),
                error_message: None,
                processed_at: None,
            },
        );
        let report = gw.get_payment_status(&a.external_payment_id).await.unwrap().unwrap();
        assert_eq!(report.status, AchPaymentStatus::Completed);

        let unknown = ExternalPaymentId::new("nope").unwrap();
        assert!(gw.get_payment_status(&unknown).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scripted_failure_applies_once() {
        let gw = MockAchGateway::new();
        gw.fail_next_create("timeout");
        assert!(matches!(
            gw.create_payment(&payment(100)).await,
            Err(AchGatewayError::Unavailable { .. })
        ));
        assert!(gw.create_payment(&payment(100)).await.is_ok());
        assert_eq!(gw.create_calls(), 2);
    }
}
