//! # ACH Remittance API
//!
//! - **POST `/v1/tax/ach/setup`**: link the tenant's funding account
//! - **GET `/v1/tax/ach/setup`**: whether a funding account is linked
//! - **GET `/v1/tax/ach/recipients`**: government recipient directory
//! - **POST `/v1/tax/ach/initiate`**: send a remittance over ACH
//! - **POST `/v1/tax/ach/payments/:external_id/poll`**: ask the gateway now
//! - **POST `/v1/tax/ach/sweep`**: poll every stale pending payment
//! - **POST `/v1/tax/ach/webhook`**: gateway status callback
//!
//! The webhook is authenticated by its HMAC signature, not the bearer token,
//! and is mounted outside the auth middleware by [`webhook_router`].
//! Bank account and routing numbers never leave this module in the clear;
//! views carry the last four digits only.

use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use zeroize::Zeroizing;

use remit_core::{
    AchPaymentId, Cents, ExternalAccountId, ExternalPaymentId, RemittanceId, TenantId,
};
use remit_engine::{LinkedBankAccount, RecipientDetails, ReconcileOutcome, SweepSummary};
use remit_gateway::{
    fallback_recipients, BankAccountType, GovernmentRecipient, LinkBankAccountRequest,
    RemitianWebhook, TaxType, SIGNATURE_HEADER,
};
use remit_state::{AchPaymentStatus, PaymentReport, RecipientType, TaxAchPayment, TaxRemittance};

use crate::error::AppError;
use crate::extractors::{extract_query, extract_validated_json, Validate};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

/// Request to link a funding account.
///
/// Custom `Debug` redacts the bank numbers.
#[derive(Deserialize, ToSchema)]
pub struct SetupAchRequest {
    #[schema(value_type = String)]
    pub tenant_id: TenantId,
    pub routing_number: String,
    pub account_number: String,
    /// `checking` or `savings`.
    #[schema(value_type = String)]
    pub account_type: BankAccountType,
    pub account_holder_name: String,
}

impl std::fmt::Debug for SetupAchRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupAchRequest")
            .field("tenant_id", &self.tenant_id)
            .field("routing_number", &"[REDACTED]")
            .field("account_number", &"[REDACTED]")
            .field("account_type", &self.account_type)
            .field("account_holder_name", &self.account_holder_name)
            .finish()
    }
}

impl Validate for SetupAchRequest {
    fn validate(&self) -> Result<(), String> {
        if self.account_holder_name.trim().is_empty() {
            return Err("account_holder_name must not be empty".to_string());
        }
        Ok(())
    }
}

impl SetupAchRequest {
    fn into_link_request(self) -> LinkBankAccountRequest {
        LinkBankAccountRequest {
            routing_number: Zeroizing::new(self.routing_number),
            account_number: Zeroizing::new(self.account_number),
            account_type: self.account_type,
            account_holder_name: self.account_holder_name,
        }
    }
}

/// A linked funding account without its sealed numbers.
#[derive(Debug, Serialize)]
pub struct LinkedAccountView {
    pub external_account_id: ExternalAccountId,
    pub account_type: BankAccountType,
    pub holder_name: String,
    pub account_last4: String,
    pub linked_at: DateTime<Utc>,
}

impl From<&LinkedBankAccount> for LinkedAccountView {
    fn from(account: &LinkedBankAccount) -> Self {
        Self {
            external_account_id: account.external_account_id.clone(),
            account_type: account.account_type,
            holder_name: account.holder_name.clone(),
            account_last4: account.account_last4.clone(),
            linked_at: account.linked_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AchSetupStatus {
    pub linked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<LinkedAccountView>,
}

#[derive(Debug, Deserialize)]
pub struct SetupQuery {
    pub tenant_id: TenantId,
}

#[derive(Debug, Deserialize)]
pub struct RecipientsQuery {
    pub state: String,
    #[serde(default)]
    pub tax_type: TaxType,
}

#[derive(Debug, Serialize)]
pub struct RecipientsResponse {
    pub state: String,
    pub tax_type: TaxType,
    /// `gateway` or `fallback`.
    pub source: &'static str,
    pub recipients: Vec<GovernmentRecipient>,
}

/// Recipient bank coordinates supplied with an initiation request.
#[derive(Deserialize, ToSchema)]
pub struct RecipientBody {
    #[serde(default)]
    #[schema(value_type = String)]
    pub recipient_type: RecipientType,
    pub name: String,
    pub routing_number: String,
    pub account_number: String,
}

impl std::fmt::Debug for RecipientBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecipientBody")
            .field("recipient_type", &self.recipient_type)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl From<RecipientBody> for RecipientDetails {
    fn from(body: RecipientBody) -> Self {
        Self {
            recipient_type: body.recipient_type,
            name: body.name,
            routing_number: body.routing_number,
            account_number: body.account_number,
        }
    }
}

/// Request to pay a remittance over ACH.
///
/// Without `recipient`, the tenant's configured remittance recipient is used.
#[derive(Debug, Deserialize, ToSchema)]
pub struct InitiateAchRequest {
    #[schema(value_type = String)]
    pub tenant_id: TenantId,
    pub remittance_id: Uuid,
    #[serde(default)]
    pub recipient: Option<RecipientBody>,
    #[serde(default)]
    pub memo: Option<String>,
}

impl Validate for InitiateAchRequest {
    fn validate(&self) -> Result<(), String> {
        if let Some(memo) = &self.memo {
            if memo.len() > 80 {
                return Err("memo must not exceed 80 characters".to_string());
            }
        }
        Ok(())
    }
}

/// An ACH payment as shown to operators.
#[derive(Debug, Serialize)]
pub struct PaymentView {
    pub id: AchPaymentId,
    pub remittance_id: RemittanceId,
    pub external_payment_id: Option<ExternalPaymentId>,
    pub amount: Cents,
    pub status: AchPaymentStatus,
    pub recipient_name: String,
    pub recipient_type: RecipientType,
    pub account_last4: String,
    pub confirmation_number: Option<String>,
    pub error_message: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&TaxAchPayment> for PaymentView {
    fn from(payment: &TaxAchPayment) -> Self {
        Self {
            id: payment.id,
            remittance_id: payment.remittance_id,
            external_payment_id: payment.external_payment_id.clone(),
            amount: payment.amount,
            status: payment.status,
            recipient_name: payment.recipient.name.clone(),
            recipient_type: payment.recipient.recipient_type,
            account_last4: payment.recipient.account_last4.clone(),
            confirmation_number: payment.confirmation_number.clone(),
            error_message: payment.error_message.clone(),
            processed_at: payment.processed_at,
            created_at: payment.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InitiateAchResponse {
    pub payment: PaymentView,
    pub remittance: TaxRemittance,
    pub expected_completion: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ReconcileOutcome>,
}

impl WebhookAck {
    fn payment_not_found() -> Self {
        Self {
            received: true,
            message: Some("Payment not found"),
            outcome: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Routers
// ---------------------------------------------------------------------------

/// Operator routes, behind bearer auth.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/tax/ach/setup", get(ach_setup_status).post(setup_ach))
        .route("/v1/tax/ach/recipients", get(list_recipients))
        .route("/v1/tax/ach/initiate", post(initiate_ach))
        .route(
            "/v1/tax/ach/payments/:external_id/poll",
            post(poll_payment),
        )
        .route("/v1/tax/ach/sweep", post(sweep_payments))
}

/// Gateway callback, authenticated by signature.
pub fn webhook_router() -> Router<AppState> {
    Router::new().route("/v1/tax/ach/webhook", post(ach_webhook))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /v1/tax/ach/setup
#[utoipa::path(
    post,
    path = "/v1/tax/ach/setup",
    request_body = SetupAchRequest,
    responses(
        (status = 201, description = "Funding account linked"),
        (status = 422, description = "Invalid bank details", body = crate::error::ErrorBody),
        (status = 502, description = "ACH gateway unavailable", body = crate::error::ErrorBody),
    ),
    tag = "ach"
)]
pub async fn setup_ach(
    State(state): State<AppState>,
    body: Result<Json<SetupAchRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<LinkedAccountView>), AppError> {
    let req = extract_validated_json(body)?;
    let tenant_id = req.tenant_id;
    let account = state
        .reconciler
        .link_account(tenant_id, &req.into_link_request())
        .await?;
    Ok((StatusCode::CREATED, Json(LinkedAccountView::from(&account))))
}

/// GET /v1/tax/ach/setup
#[utoipa::path(
    get,
    path = "/v1/tax/ach/setup",
    params(("tenant_id" = String, Query, description = "Tenant")),
    responses((status = 200, description = "Funding account status")),
    tag = "ach"
)]
pub async fn ach_setup_status(
    State(state): State<AppState>,
    query: Result<Query<SetupQuery>, QueryRejection>,
) -> Result<Json<AchSetupStatus>, AppError> {
    let query = extract_query(query)?;
    let account = state
        .directory
        .linked_account(query.tenant_id)
        .await
        .map_err(remit_engine::EngineError::from)?;
    Ok(Json(AchSetupStatus {
        linked: account.is_some(),
        account: account.as_ref().map(LinkedAccountView::from),
    }))
}

/// GET /v1/tax/ach/recipients
///
/// Falls back to the built-in directory when the gateway errors or knows no
/// recipient for the state.
#[utoipa::path(
    get,
    path = "/v1/tax/ach/recipients",
    params(
        ("state" = String, Query, description = "Two-letter state code"),
        ("tax_type" = Option<String>, Query, description = "sales_tax (default) or income_tax"),
    ),
    responses((status = 200, description = "Recipients for the state")),
    tag = "ach"
)]
pub async fn list_recipients(
    State(state): State<AppState>,
    query: Result<Query<RecipientsQuery>, QueryRejection>,
) -> Result<Json<RecipientsResponse>, AppError> {
    let query = extract_query(query)?;
    let code = query.state.trim().to_ascii_uppercase();
    if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::Validation(
            "state must be a two-letter code".to_string(),
        ));
    }

    let (source, recipients) = match state
        .reconciler
        .gateway()
        .list_recipients(&code, query.tax_type)
        .await
    {
        Ok(list) if !list.is_empty() => ("gateway", list),
        Ok(_) => ("fallback", fallback_recipients(&code, query.tax_type)),
        Err(err) => {
            tracing::warn!(state = %code, error = %err, "recipient lookup failed, using fallback directory");
            ("fallback", fallback_recipients(&code, query.tax_type))
        }
    };

    Ok(Json(RecipientsResponse {
        state: code,
        tax_type: query.tax_type,
        source,
        recipients,
    }))
}

/// POST /v1/tax/ach/initiate
#[utoipa::path(
    post,
    path = "/v1/tax/ach/initiate",
    request_body = InitiateAchRequest,
    responses(
        (status = 201, description = "ACH payment submitted; remittance is processing"),
        (status = 404, description = "Remittance not found", body = crate::error::ErrorBody),
        (status = 409, description = "Already processed, payment in flight, or no linked account", body = crate::error::ErrorBody),
        (status = 502, description = "ACH gateway unavailable", body = crate::error::ErrorBody),
    ),
    tag = "ach"
)]
pub async fn initiate_ach(
    State(state): State<AppState>,
    body: Result<Json<InitiateAchRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<InitiateAchResponse>), AppError> {
    let req = extract_validated_json(body)?;
    let recipient = match req.recipient {
        Some(body) => RecipientDetails::from(body),
        None => super::tenant_settings(&state, req.tenant_id)
            .await?
            .remittance_recipient
            .ok_or_else(|| {
                AppError::Validation(
                    "recipient is required when the tenant has no remittance recipient configured"
                        .to_string(),
                )
            })?,
    };

    let initiated = state
        .reconciler
        .initiate(
            req.tenant_id,
            RemittanceId::from_uuid(req.remittance_id),
            &recipient,
            req.memo.as_deref(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(InitiateAchResponse {
            payment: PaymentView::from(&initiated.payment),
            remittance: initiated.remittance,
            expected_completion: initiated.expected_completion,
        }),
    ))
}

/// POST /v1/tax/ach/payments/:external_id/poll
#[utoipa::path(
    post,
    path = "/v1/tax/ach/payments/{external_id}/poll",
    params(("external_id" = String, Path, description = "Gateway payment ID")),
    responses(
        (status = 200, description = "Reconciliation outcome"),
        (status = 404, description = "Unknown at the gateway", body = crate::error::ErrorBody),
    ),
    tag = "ach"
)]
pub async fn poll_payment(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> Result<Json<ReconcileOutcome>, AppError> {
    let external_id = ExternalPaymentId::new(external_id)?;
    let outcome = state.reconciler.poll(&external_id).await?;
    Ok(Json(outcome))
}

/// POST /v1/tax/ach/sweep
#[utoipa::path(
    post,
    path = "/v1/tax/ach/sweep",
    responses((status = 200, description = "Sweep summary")),
    tag = "ach"
)]
pub async fn sweep_payments(
    State(state): State<AppState>,
) -> Result<Json<SweepSummary>, AppError> {
    let summary = state.reconciler.sweep(state.stale_after()).await?;
    Ok(Json(summary))
}

/// POST /v1/tax/ach/webhook
///
/// The body is verified against the raw bytes before it is parsed.
#[utoipa::path(
    post,
    path = "/v1/tax/ach/webhook",
    responses(
        (status = 200, description = "Webhook received"),
        (status = 400, description = "Malformed payload", body = crate::error::ErrorBody),
        (status = 401, description = "Missing or invalid signature", body = crate::error::ErrorBody),
        (status = 503, description = "Webhook secret not configured", body = crate::error::ErrorBody),
    ),
    tag = "ach"
)]
pub async fn ach_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let secret = state.config.webhook_secret.as_deref().ok_or_else(|| {
        tracing::error!("ACH webhook received but no webhook secret is configured");
        AppError::ServiceUnavailable("webhook verification is not configured".to_string())
    })?;
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    if !state
        .reconciler
        .gateway()
        .verify_webhook_signature(&body, signature, secret)
    {
        tracing::warn!(has_signature = signature.is_some(), "ACH webhook signature rejected");
        return Err(AppError::Unauthorized(
            "invalid webhook signature".to_string(),
        ));
    }

    let event: RemitianWebhook = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid webhook payload: {e}")))?;
    let raw_id = event
        .payment_id
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("webhook payload has no payment_id".to_string()))?;

    // Unknown payments are acknowledged before the status is looked at.
    let external_id = match ExternalPaymentId::new(raw_id) {
        Ok(id) => id,
        Err(e) => {
            tracing::info!(error = %e, "webhook for unrecognizable payment id ignored");
            return Ok(Json(WebhookAck::payment_not_found()));
        }
    };
    if state.reconciler.find_payment(&external_id).await?.is_none() {
        tracing::info!(
            external_payment_id = %external_id,
            "webhook for unknown ACH payment ignored"
        );
        return Ok(Json(WebhookAck::payment_not_found()));
    }

    let raw_status = event.status.as_deref().unwrap_or_default();
    let status = AchPaymentStatus::from_gateway(raw_status)
        .ok_or_else(|| AppError::BadRequest(format!("unknown payment status '{raw_status}'")))?;

    let report = PaymentReport {
        status,
        confirmation_number: event.confirmation_number,
        error_message: event.error_message,
        processed_at: event.processed_at,
    };
    let outcome = state.reconciler.reconcile(&external_id, &report).await?;

    let ack = match outcome {
        ReconcileOutcome::UnknownPayment => WebhookAck::payment_not_found(),
        other => WebhookAck {
            received: true,
            message: None,
            outcome: Some(other),
        },
    };
    Ok(Json(ack))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_request_debug_redacts_numbers() {
        let req = SetupAchRequest {
            tenant_id: TenantId::new(),
            routing_number: "111000025".into(),
            account_number: "000123456789".into(),
            account_type: BankAccountType::Checking,
            account_holder_name: "Acme Coffee LLC".into(),
        };
        let debug = format!("{req:?}");
        assert!(!debug.contains("111000025"));
        assert!(!debug.contains("000123456789"));
        assert!(debug.contains("Acme Coffee LLC"));
    }

    #[test]
    fn setup_request_requires_holder_name() {
        let req = SetupAchRequest {
            tenant_id: TenantId::new(),
            routing_number: "111000025".into(),
            account_number: "000123456789".into(),
            account_type: BankAccountType::Savings,
            account_holder_name: "  ".into(),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn webhook_ack_omits_empty_fields() {
        let json = serde_json::to_value(WebhookAck::payment_not_found()).unwrap();
        assert_eq!(json["received"], true);
        assert_eq!(json["message"], "Payment not found");
        assert!(json.get("outcome").is_none());
    }
}
