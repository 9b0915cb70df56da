//! # Period Report API
//!
//! - **GET `/v1/tax/reports`**: collected tax and remittances over a period.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use remit_core::{RemittancePeriod, TenantId};
use remit_engine::PeriodReport;

use crate::error::AppError;
use crate::extractors::extract_query;
use crate::state::AppState;

/// Query parameters for a period report. Without `start` and `end` the
/// report covers the tenant's current remittance period.
#[derive(Debug, Deserialize)]
pub struct PeriodReportQuery {
    pub tenant_id: TenantId,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/tax/reports", get(period_report))
}

/// GET /v1/tax/reports
#[utoipa::path(
    get,
    path = "/v1/tax/reports",
    params(
        ("tenant_id" = String, Query, description = "Tenant"),
        ("start" = Option<String>, Query, description = "First day, YYYY-MM-DD"),
        ("end" = Option<String>, Query, description = "Last day, YYYY-MM-DD"),
    ),
    responses(
        (status = 200, description = "Period report"),
        (status = 422, description = "Invalid period", body = crate::error::ErrorBody),
    ),
    tag = "reports"
)]
pub async fn period_report(
    State(state): State<AppState>,
    query: Result<Query<PeriodReportQuery>, QueryRejection>,
) -> Result<Json<PeriodReport>, AppError> {
    let query = extract_query(query)?;
    let period = match (query.start, query.end) {
        (Some(start), Some(end)) => RemittancePeriod::custom(start, end)?,
        (None, None) => {
            let settings = super::tenant_settings(&state, query.tenant_id).await?;
            RemittancePeriod::current(settings.remittance_schedule, Utc::now().date_naive())?
        }
        _ => {
            return Err(AppError::Validation(
                "start and end must be given together".to_string(),
            ))
        }
    };
    let report = state.reports.period_report(query.tenant_id, period).await?;
    Ok(Json(report))
}
