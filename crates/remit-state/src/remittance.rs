//! # Tax Remittance State Machine
//!
//! Tracks one tenant's obligation for one period, from aggregation to the
//! moment the money reaches the government recipient.
//!
//! ## States
//!
//! ```text
//!             begin_automatic          mark_completed
//! Pending ───────────────▶ Processing ──────────────▶ Completed
//!    │                       │   ▲                        ▲
//!    │                       │   │ begin_automatic        │
//!    │          mark_failed  ▼   │ (retry)                │
//!    │                      Failed ───────────────────────┤
//!    │                                attest_manual       │
//!    └────────────────────────────────────────────────────┘
//!                         attest_manual
//! ```
//!
//! `Completed` is terminal apart from manual corrections, which may only
//! raise `total_tax_remitted`.
//!
//! ## Invariant
//!
//! `total_tax_remitted ≤ total_tax_collected` after every transition, and
//! `total_tax_remitted` never decreases. A correction is the only operation
//! that may push remitted above collected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use remit_core::{Cents, RemittanceId, RemittancePeriod, TenantId};

// ─── Status and Method ───────────────────────────────────────────────

/// Lifecycle status of a remittance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemittanceStatus {
    /// Aggregated, nothing sent yet.
    Pending,
    /// An ACH payment is in flight.
    Processing,
    /// Money delivered (ACH confirmed or operator attested).
    Completed,
    /// Last ACH attempt failed; may be retried or attested manually.
    Failed,
}

impl RemittanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether a new remittance attempt (manual or automatic) may start.
    pub fn accepts_new_attempt(&self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for RemittanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the money was (or is being) moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemittanceMethod {
    /// Operator paid out of band and attested with a reference.
    Manual,
    /// Paid through the ACH gateway.
    Automatic,
}

impl RemittanceMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Automatic => "automatic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(Self::Manual),
            "automatic" => Some(Self::Automatic),
            _ => None,
        }
    }
}

impl std::fmt::Display for RemittanceMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors from remittance transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemittanceError {
    /// The remittance is already completed.
    #[error("remittance already processed")]
    AlreadyProcessed,

    /// Attempted transition is not valid from the current status.
    #[error("invalid remittance transition: {from} -> {to}")]
    InvalidTransition {
        from: RemittanceStatus,
        to: RemittanceStatus,
    },

    /// No further status changes are possible.
    #[error("remittance is in terminal state {state}")]
    TerminalState { state: RemittanceStatus },

    /// A correction was rejected.
    #[error("invalid correction: {0}")]
    InvalidCorrection(String),
}

// ─── Snapshot and History Records ────────────────────────────────────

/// Tax collected in one jurisdiction over the period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JurisdictionTotal {
    pub jurisdiction: String,
    pub tax_amount: Cents,
    pub order_count: u64,
}

/// Aggregation snapshot taken when the remittance was created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportData {
    pub breakdown: Vec<JurisdictionTotal>,
    pub order_count: u64,
}

/// Record of a status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: RemittanceStatus,
    pub to: RemittanceStatus,
    pub at: DateTime<Utc>,
    pub reason: String,
}

/// Record of a manual correction to the remitted total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionRecord {
    pub previous_remitted: Cents,
    pub corrected_remitted: Cents,
    pub note: String,
    pub at: DateTime<Utc>,
}

// ─── Tax Remittance ──────────────────────────────────────────────────

/// One tenant's tax obligation for one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxRemittance {
    pub id: RemittanceId,
    pub tenant_id: TenantId,
    pub period: RemittancePeriod,
    pub total_tax_collected: Cents,
    pub total_tax_remitted: Cents,
    pub status: RemittanceStatus,
    pub method: RemittanceMethod,
    pub remittance_date: Option<DateTime<Utc>>,
    pub remittance_reference: Option<String>,
    pub report_data: ReportData,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Ordered log of status transitions.
    pub transitions: Vec<TransitionRecord>,
    #[serde(default)]
    pub corrections: Vec<CorrectionRecord>,
}

impl TaxRemittance {
    /// A fresh `Pending` remittance with nothing remitted yet.
    pub fn new(
        tenant_id: TenantId,
        period: RemittancePeriod,
        method: RemittanceMethod,
        total_tax_collected: Cents,
        report_data: ReportData,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: RemittanceId::new(),
            tenant_id,
            period,
            total_tax_collected,
            total_tax_remitted: Cents::ZERO,
            status: RemittanceStatus::Pending,
            method,
            remittance_date: None,
            remittance_reference: None,
            report_data,
            notes: None,
            created_at: now,
            updated_at: now,
            transitions: Vec::new(),
            corrections: Vec::new(),
        }
    }

    /// Outstanding balance: collected minus remitted.
    pub fn amount_due(&self) -> Cents {
        self.total_tax_collected - self.total_tax_remitted
    }

    /// Operator attests the money was paid out of band
    /// (PENDING or FAILED → COMPLETED).
    pub fn attest_manual(&mut self, reference: &str) -> Result<(), RemittanceError> {
        self.require_new_attempt(RemittanceStatus::Completed)?;
        self.method = RemittanceMethod::Manual;
        self.settle(Some(reference.to_string()));
        self.do_transition(
            RemittanceStatus::Completed,
            &format!("manual attestation, reference {reference}"),
        );
        Ok(())
    }

    /// An ACH transfer is about to be recorded (PENDING or FAILED → PROCESSING).
    pub fn begin_automatic(&mut self) -> Result<(), RemittanceError> {
        self.require_new_attempt(RemittanceStatus::Processing)?;
        self.method = RemittanceMethod::Automatic;
        self.do_transition(RemittanceStatus::Processing, "ACH payment initiated");
        Ok(())
    }

    /// The ACH transfer settled (PROCESSING → COMPLETED).
    ///
    /// Returns `false` without changing anything when already completed.
    pub fn mark_completed(&mut self, reference: Option<&str>) -> Result<bool, RemittanceError> {
        match self.status {
            RemittanceStatus::Completed => Ok(false),
            RemittanceStatus::Processing => {
                self.settle(reference.map(str::to_string));
                self.do_transition(RemittanceStatus::Completed, "ACH payment completed");
                Ok(true)
            }
            from => Err(RemittanceError::InvalidTransition {
                from,
                to: RemittanceStatus::Completed,
            }),
        }
    }

    /// The ACH transfer failed (PROCESSING → FAILED). Remitted total is untouched.
    ///
    /// Returns `false` without changing anything when already failed.
    pub fn mark_failed(&mut self, reason: &str) -> Result<bool, RemittanceError> {
        match self.status {
            RemittanceStatus::Failed => Ok(false),
            RemittanceStatus::Processing => {
                self.notes = Some(reason.to_string());
                self.do_transition(RemittanceStatus::Failed, reason);
                Ok(true)
            }
            RemittanceStatus::Completed => Err(RemittanceError::TerminalState {
                state: RemittanceStatus::Completed,
            }),
            from => Err(RemittanceError::InvalidTransition {
                from,
                to: RemittanceStatus::Failed,
            }),
        }
    }

    /// Raise the remitted total on a completed remittance.
    ///
    /// The new total may exceed what was collected (e.g. penalties paid) but
    /// can never be lower than what is already recorded.
    pub fn record_correction(
        &mut self,
        new_remitted: Cents,
        note: &str,
    ) -> Result<(), RemittanceError> {
        if self.status != RemittanceStatus::Completed {
            return Err(RemittanceError::InvalidCorrection(format!(
                "only completed remittances can be corrected (status is {})",
                self.status
            )));
        }
        if new_remitted < self.total_tax_remitted {
            return Err(RemittanceError::InvalidCorrection(format!(
                "remitted total cannot decrease from {} to {}",
                self.total_tax_remitted, new_remitted
            )));
        }
        let now = Utc::now();
        self.corrections.push(CorrectionRecord {
            previous_remitted: self.total_tax_remitted,
            corrected_remitted: new_remitted,
            note: note.to_string(),
            at: now,
        });
        self.total_tax_remitted = new_remitted;
        self.notes = Some(match self.notes.take() {
            Some(existing) if !existing.is_empty() => format!("{existing}\n{note}"),
            _ => note.to_string(),
        });
        self.updated_at = now;
        Ok(())
    }

    fn require_new_attempt(&self, target: RemittanceStatus) -> Result<(), RemittanceError> {
        match self.status {
            RemittanceStatus::Completed => Err(RemittanceError::AlreadyProcessed),
            s if s.accepts_new_attempt() => Ok(()),
            from => Err(RemittanceError::InvalidTransition { from, to: target }),
        }
    }

    fn settle(&mut self, reference: Option<String>) {
        // Never lower an already-recorded remitted total.
        if self.total_tax_collected > self.total_tax_remitted {
            self.total_tax_remitted = self.total_tax_collected;
        }
        self.remittance_date = Some(Utc::now());
        if reference.is_some() {
            self.remittance_reference = reference;
        }
    }

    fn do_transition(&mut self, to: RemittanceStatus, reason: &str) {
        let now = Utc::now();
        self.transitions.push(TransitionRecord {
            from: self.status,
            to,
            at: now,
            reason: reason.to_string(),
        });
        self.status = to;
        self.updated_at = now;
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
