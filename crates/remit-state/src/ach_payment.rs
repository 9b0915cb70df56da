//! # ACH Payment Reconciliation Ordering
//!
//! A `TaxAchPayment` is the local record of one transfer submitted to the
//! ACH gateway. The gateway reports progress by polling responses and
//! webhooks, both of which may repeat or arrive out of order.
//!
//! ## Ordering
//!
//! ```text
//! Pending (rank 0) ──▶ Completed (rank 1)
//!                 └──▶ Failed    (rank 1)
//! ```
//!
//! A report is applied only when it moves the payment forward. Once a
//! payment is terminal, same-rank or lower-rank reports are duplicates, and a
//! report for the *other* terminal status is a conflict that is ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use remit_core::{
    AchPaymentId, Cents, ExternalAccountId, ExternalPaymentId, RemittanceId, SealedSecret,
    TenantId, ValidationError,
};

/// Local status of an ACH transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchPaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl AchPaymentStatus {
    /// Position in the progress ordering.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Completed | Self::Failed => 1,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() == 1
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Map a gateway status string. The gateway's `processing` is still
    /// pending from our side.
    pub fn from_gateway(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" | "processing" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for AchPaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of government body receiving the payment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientType {
    #[default]
    State,
    City,
    County,
}

impl RecipientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::State => "state",
            Self::City => "city",
            Self::County => "county",
        }
    }
}

impl std::str::FromStr for RecipientType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "state" => Ok(Self::State),
            "city" => Ok(Self::City),
            "county" => Ok(Self::County),
            _ => Err(ValidationError::UnknownVariant {
                kind: "recipient type",
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for RecipientType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Government recipient with sealed bank coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedRecipient {
    pub recipient_type: RecipientType,
    pub name: String,
    pub routing_number: SealedSecret,
    pub account_number: SealedSecret,
    /// Display-only tail of the account number.
    pub account_last4: String,
}

/// A status report from the gateway, by poll or webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReport {
    pub status: AchPaymentStatus,
    pub confirmation_number: Option<String>,
    pub error_message: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// What applying a report did to the payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportEffect {
    /// Status advanced.
    Applied {
        from: AchPaymentStatus,
        to: AchPaymentStatus,
    },
    /// Still pending; detail fields refreshed.
    Refreshed,
    /// Already at or past the reported status.
    Duplicate,
    /// Terminal payment received the opposite terminal status.
    Conflict {
        current: AchPaymentStatus,
        reported: AchPaymentStatus,
    },
}

/// Local record of an ACH transfer for a remittance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxAchPayment {
    pub id: AchPaymentId,
    pub tenant_id: TenantId,
    pub remittance_id: RemittanceId,
    pub external_payment_id: Option<ExternalPaymentId>,
    pub recipient: SealedRecipient,
    pub funding_account_id: ExternalAccountId,
    pub amount: Cents,
    pub status: AchPaymentStatus,
    pub confirmation_number: Option<String>,
    pub error_message: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaxAchPayment {
    /// A pending payment for a transfer the gateway just accepted.
    pub fn submitted(
        tenant_id: TenantId,
        remittance_id: RemittanceId,
        external_payment_id: ExternalPaymentId,
        recipient: SealedRecipient,
        funding_account_id: ExternalAccountId,
        amount: Cents,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: AchPaymentId::new(),
            tenant_id,
            remittance_id,
            external_payment_id: Some(external_payment_id),
            recipient,
            funding_account_id,
            amount,
            status: AchPaymentStatus::Pending,
            confirmation_number: None,
            error_message: None,
            processed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this payment blocks another attempt for the same remittance.
    pub fn is_active(&self) -> bool {
        self.status != AchPaymentStatus::Failed
    }

    /// Classify `report` against the current status without mutating.
    pub fn classify(&self, report: &PaymentReport) -> ReportEffect {
        let current = self.status;
        let reported = report.status;
        if current.is_terminal() {
            if reported == current || reported.rank() < current.rank() {
                ReportEffect::Duplicate
            } else {
                ReportEffect::Conflict { current, reported }
            }
        } else if reported == current {
            ReportEffect::Refreshed
        } else {
            ReportEffect::Applied {
                from: current,
                to: reported,
            }
        }
    }

    /// Apply a gateway report. Terminal updates default `processed_at` to now.
    pub fn apply_report(&mut self, report: &PaymentReport) -> ReportEffect {
        let effect = self.classify(report);
        match effect {
            ReportEffect::Applied { to, .. } => {
                let now = Utc::now();
                self.status = to;
                if report.confirmation_number.is_some() {
                    self.confirmation_number = report.confirmation_number.clone();
                }
                if report.error_message.is_some() {
                    self.error_message = report.error_message.clone();
                }
                self.processed_at = Some(report.processed_at.unwrap_or(now));
                self.updated_at = now;
            }
            ReportEffect::Refreshed => {
                if report.confirmation_number.is_some() {
                    self.confirmation_number = report.confirmation_number.clone();
                }
                if report.error_message.is_some() {
                    self.error_message = report.error_message.clone();
                }
                self.updated_at = Utc::now();
            }
            ReportEffect::Duplicate | ReportEffect::Conflict { .. } => {}
        }
        effect
    }
}
