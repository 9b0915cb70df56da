//! # Remittance API
//!
//! - **GET `/v1/tax/remittances`**: status, history and current-period summary
//! - **POST `/v1/tax/remittances`**: create the remittance for a period
//! - **GET `/v1/tax/remittances/:id`**: one remittance with its ACH payments
//! - **POST `/v1/tax/remittances/:id/attest`**: manual payment attestation
//! - **POST `/v1/tax/remittances/:id/correction`**: raise the remitted total
//! - **GET `/v1/tax/remittances/:id/report`**: HTML or CSV document
//!
//! Every route is scoped by `tenant_id`; another tenant's remittance is
//! reported as not found.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use remit_core::{Cents, RemittanceId, RemittancePeriod, RemittanceSchedule, TenantId};
use remit_engine::{AggregateSummary, CreateOutcome, ReportGenerator};
use remit_state::{RemittanceMethod, RemittanceStatus, TaxRemittance};

use super::ach::PaymentView;
use crate::error::AppError;
use crate::extractors::{extract_query, extract_validated_json, Validate};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

/// Query parameters naming the tenant.
#[derive(Debug, Deserialize)]
pub struct TenantQuery {
    pub tenant_id: TenantId,
}

/// Query parameters for the remittance overview.
#[derive(Debug, Deserialize)]
pub struct OverviewQuery {
    pub tenant_id: TenantId,
    /// History length (default 12, max 120).
    pub limit: Option<usize>,
}

const MAX_HISTORY: usize = 120;

/// Request to create a remittance.
///
/// With both `period_start` and `period_end` the period is taken as given;
/// with neither it is the current period of the tenant's schedule.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRemittanceRequest {
    #[schema(value_type = String)]
    pub tenant_id: TenantId,
    #[schema(value_type = Option<String>, example = "2024-01-01")]
    pub period_start: Option<NaiveDate>,
    #[schema(value_type = Option<String>, example = "2024-01-31")]
    pub period_end: Option<NaiveDate>,
    /// `manual` (default) or `automatic`.
    #[schema(value_type = Option<String>)]
    pub method: Option<RemittanceMethod>,
}

impl Validate for CreateRemittanceRequest {
    fn validate(&self) -> Result<(), String> {
        match (self.period_start, self.period_end) {
            (Some(start), Some(end)) if start > end => {
                Err("period_start must not be after period_end".to_string())
            }
            (Some(_), None) | (None, Some(_)) => {
                Err("period_start and period_end must be given together".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Request to attest a remittance paid outside the ACH rail.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AttestRequest {
    #[schema(value_type = String)]
    pub tenant_id: TenantId,
    /// Confirmation or check number from the tax authority.
    pub reference: String,
}

impl Validate for AttestRequest {
    fn validate(&self) -> Result<(), String> {
        if self.reference.trim().is_empty() {
            return Err("reference must not be empty".to_string());
        }
        if self.reference.len() > 255 {
            return Err("reference must not exceed 255 characters".to_string());
        }
        Ok(())
    }
}

/// Request to correct the remitted total of a completed remittance.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CorrectionRequest {
    #[schema(value_type = String)]
    pub tenant_id: TenantId,
    #[schema(value_type = String, example = "512.40")]
    pub total_remitted: Cents,
    pub note: String,
}

impl Validate for CorrectionRequest {
    fn validate(&self) -> Result<(), String> {
        if self.note.trim().is_empty() {
            return Err("note must not be empty".to_string());
        }
        if self.total_remitted.is_negative() {
            return Err("total_remitted must not be negative".to_string());
        }
        Ok(())
    }
}

/// Query parameters for a report document.
#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub tenant_id: TenantId,
    #[serde(default)]
    pub format: ReportFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Html,
    Csv,
}

/// Remittance status for a tenant.
#[derive(Debug, Serialize)]
pub struct RemittanceOverview {
    pub tenant_id: TenantId,
    pub remittance_enabled: bool,
    pub schedule: RemittanceSchedule,
    pub current_period: RemittancePeriod,
    /// Tax collected so far in the current period.
    pub current_period_summary: AggregateSummary,
    /// Collected minus remitted across pending and failed remittances.
    pub outstanding: Cents,
    pub history: Vec<TaxRemittance>,
}

/// One remittance and its ACH payments.
#[derive(Debug, Serialize)]
pub struct RemittanceDetail {
    pub remittance: TaxRemittance,
    pub amount_due: Cents,
    pub payments: Vec<PaymentView>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/tax/remittances",
            get(remittance_overview).post(create_remittance),
        )
        .route("/v1/tax/remittances/:id", get(get_remittance))
        .route("/v1/tax/remittances/:id/attest", post(attest_remittance))
        .route("/v1/tax/remittances/:id/correction", post(correct_remittance))
        .route("/v1/tax/remittances/:id/report", get(remittance_report))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /v1/tax/remittances
#[utoipa::path(
    get,
    path = "/v1/tax/remittances",
    params(
        ("tenant_id" = String, Query, description = "Tenant"),
        ("limit" = Option<usize>, Query, description = "History length"),
    ),
    responses((status = 200, description = "Remittance status, history and current-period summary")),
    tag = "remittances"
)]
pub async fn remittance_overview(
    State(state): State<AppState>,
    query: Result<Query<OverviewQuery>, QueryRejection>,
) -> Result<Json<RemittanceOverview>, AppError> {
    let query = extract_query(query)?;
    let settings = super::tenant_settings(&state, query.tenant_id).await?;
    let current_period =
        RemittancePeriod::current(settings.remittance_schedule, Utc::now().date_naive())?;
    let current_period_summary = state
        .remittances
        .aggregator()
        .aggregate(query.tenant_id, &current_period)
        .await
        .map_err(remit_engine::EngineError::from)?;
    let history = state
        .remittances
        .history(query.tenant_id, query.limit.map(|l| l.clamp(1, MAX_HISTORY)))
        .await?;
    let outstanding = history
        .iter()
        .filter(|r| matches!(r.status, RemittanceStatus::Pending | RemittanceStatus::Failed))
        .map(TaxRemittance::amount_due)
        .sum();

    Ok(Json(RemittanceOverview {
        tenant_id: query.tenant_id,
        remittance_enabled: settings.remittance_enabled,
        schedule: settings.remittance_schedule,
        current_period,
        current_period_summary,
        outstanding,
        history,
    }))
}

/// POST /v1/tax/remittances
#[utoipa::path(
    post,
    path = "/v1/tax/remittances",
    request_body = CreateRemittanceRequest,
    responses(
        (status = 201, description = "Remittance created"),
        (status = 200, description = "An overlapping remittance already existed and is returned"),
        (status = 422, description = "Invalid period", body = crate::error::ErrorBody),
    ),
    tag = "remittances"
)]
pub async fn create_remittance(
    State(state): State<AppState>,
    body: Result<Json<CreateRemittanceRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateOutcome>), AppError> {
    let req = extract_validated_json(body)?;
    let period = match (req.period_start, req.period_end) {
        (Some(start), Some(end)) => RemittancePeriod::custom(start, end)?,
        _ => {
            let settings = super::tenant_settings(&state, req.tenant_id).await?;
            RemittancePeriod::current(settings.remittance_schedule, Utc::now().date_naive())?
        }
    };
    let outcome = state
        .remittances
        .create(
            req.tenant_id,
            period,
            req.method.unwrap_or(RemittanceMethod::Manual),
        )
        .await?;
    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome)))
}

/// GET /v1/tax/remittances/:id
#[utoipa::path(
    get,
    path = "/v1/tax/remittances/{id}",
    params(
        ("id" = Uuid, Path, description = "Remittance ID"),
        ("tenant_id" = String, Query, description = "Tenant"),
    ),
    responses(
        (status = 200, description = "Remittance with its ACH payments"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "remittances"
)]
pub async fn get_remittance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    query: Result<Query<TenantQuery>, QueryRejection>,
) -> Result<Json<RemittanceDetail>, AppError> {
    let query = extract_query(query)?;
    let remittance = state
        .remittances
        .get_for_tenant(query.tenant_id, RemittanceId::from_uuid(id))
        .await?;
    let payments = state
        .store
        .payments_for_remittance(remittance.id)
        .await
        .map_err(remit_engine::EngineError::from)?;
    Ok(Json(RemittanceDetail {
        amount_due: remittance.amount_due(),
        payments: payments.iter().map(PaymentView::from).collect(),
        remittance,
    }))
}

/// POST /v1/tax/remittances/:id/attest
#[utoipa::path(
    post,
    path = "/v1/tax/remittances/{id}/attest",
    params(("id" = Uuid, Path, description = "Remittance ID")),
    request_body = AttestRequest,
    responses(
        (status = 200, description = "Remittance completed manually"),
        (status = 409, description = "Already processed or ACH payment in flight", body = crate::error::ErrorBody),
    ),
    tag = "remittances"
)]
pub async fn attest_remittance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Result<Json<AttestRequest>, JsonRejection>,
) -> Result<Json<TaxRemittance>, AppError> {
    let req = extract_validated_json(body)?;
    let remittance = state
        .remittances
        .attest_manual(req.tenant_id, RemittanceId::from_uuid(id), req.reference.trim())
        .await?;
    Ok(Json(remittance))
}

/// POST /v1/tax/remittances/:id/correction
#[utoipa::path(
    post,
    path = "/v1/tax/remittances/{id}/correction",
    params(("id" = Uuid, Path, description = "Remittance ID")),
    request_body = CorrectionRequest,
    responses(
        (status = 200, description = "Remitted total corrected"),
        (status = 422, description = "Correction rejected", body = crate::error::ErrorBody),
    ),
    tag = "remittances"
)]
pub async fn correct_remittance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Result<Json<CorrectionRequest>, JsonRejection>,
) -> Result<Json<TaxRemittance>, AppError> {
    let req = extract_validated_json(body)?;
    let remittance = state
        .remittances
        .record_correction(
            req.tenant_id,
            RemittanceId::from_uuid(id),
            req.total_remitted,
            req.note.trim(),
        )
        .await?;
    Ok(Json(remittance))
}

/// GET /v1/tax/remittances/:id/report
#[utoipa::path(
    get,
    path = "/v1/tax/remittances/{id}/report",
    params(
        ("id" = Uuid, Path, description = "Remittance ID"),
        ("tenant_id" = String, Query, description = "Tenant"),
        ("format" = Option<String>, Query, description = "html (default) or csv"),
    ),
    responses(
        (status = 200, description = "Report document"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "remittances"
)]
pub async fn remittance_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    query: Result<Query<ReportQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let query = extract_query(query)?;
    let remittance = state
        .remittances
        .get_for_tenant(query.tenant_id, RemittanceId::from_uuid(id))
        .await?;
    let settings = super::tenant_settings(&state, query.tenant_id).await?;
    let tenant_name = settings.display_name();
    let stem = format!(
        "tax-remittance-{}-{}",
        remittance.period.start(),
        remittance.period.end()
    );

    let response = match query.format {
        ReportFormat::Csv => {
            let document = ReportGenerator::remittance_csv(&remittance, &tenant_name)
                .map_err(|e| AppError::Internal(format!("rendering CSV report: {e}")))?;
            (
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{stem}.csv\""),
                    ),
                ],
                document,
            )
                .into_response()
        }
        ReportFormat::Html => {
            let payments = state
                .store
                .payments_for_remittance(remittance.id)
                .await
                .map_err(remit_engine::EngineError::from)?;
            (
                [
                    (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("inline; filename=\"{stem}.html\""),
                    ),
                ],
                ReportGenerator::remittance_html(&remittance, &tenant_name, &payments),
            )
                .into_response()
        }
    };
    Ok(response)
}
