//! # Scheduler API
//!
//! - **POST `/v1/tax/scheduler/run`**: run the scheduled remittance pass.
//!
//! Normally driven by an external cron. The pass creates the previous
//! period's remittance for every enabled tenant and initiates ACH for
//! tenants with a configured recipient. Running it twice for the same date
//! creates nothing new.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use utoipa::ToSchema;

use remit_engine::ScheduleRun;

use crate::error::AppError;
use crate::extractors::extract_json;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SchedulerRunRequest {
    /// Date the run is for; defaults to today (UTC).
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "2024-02-01")]
    pub date: Option<NaiveDate>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/tax/scheduler/run", post(run_scheduler))
}

/// POST /v1/tax/scheduler/run
#[utoipa::path(
    post,
    path = "/v1/tax/scheduler/run",
    request_body = SchedulerRunRequest,
    responses((status = 200, description = "Remittances created and initiated, tenants skipped, per-tenant errors")),
    tag = "scheduler"
)]
pub async fn run_scheduler(
    State(state): State<AppState>,
    body: Result<Json<SchedulerRunRequest>, JsonRejection>,
) -> Result<Json<ScheduleRun>, AppError> {
    let req = extract_json(body)?;
    let today = req.date.unwrap_or_else(|| Utc::now().date_naive());
    let run = state.scheduler.run_scheduled(today).await?;
    tracing::info!(
        date = %today,
        created = run.created.len(),
        initiated = run.initiated.len(),
        errors = run.errors.len(),
        "scheduled remittance run finished"
    );
    Ok(Json(run))
}
