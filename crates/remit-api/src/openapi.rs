//! # OpenAPI Specification Assembly
//!
//! Assembles every utoipa-documented route into one OpenAPI document,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tax Remittance API",
        version = "0.1.0",
        description = "Checkout tax quotes, periodic sales-tax remittances, ACH payment to tax authorities with webhook reconciliation, and period reports.",
        license(name = "AGPL-3.0-or-later")
    ),
    paths(
        // Quote
        crate::routes::quote::get_quote,
        // Remittances
        crate::routes::remittances::remittance_overview,
        crate::routes::remittances::create_remittance,
        crate::routes::remittances::get_remittance,
        crate::routes::remittances::attest_remittance,
        crate::routes::remittances::correct_remittance,
        crate::routes::remittances::remittance_report,
        // ACH
        crate::routes::ach::setup_ach,
        crate::routes::ach::ach_setup_status,
        crate::routes::ach::list_recipients,
        crate::routes::ach::initiate_ach,
        crate::routes::ach::poll_payment,
        crate::routes::ach::sweep_payments,
        crate::routes::ach::ach_webhook,
        // Reports
        crate::routes::reports::period_report,
        // Scheduler
        crate::routes::scheduler::run_scheduler,
        // Settings
        crate::routes::settings::get_settings,
        crate::routes::settings::update_settings,
    ),
    components(schemas(
        // Error types
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        // Request DTOs
        crate::routes::quote::QuoteBody,
        crate::routes::remittances::CreateRemittanceRequest,
        crate::routes::remittances::AttestRequest,
        crate::routes::remittances::CorrectionRequest,
        crate::routes::ach::SetupAchRequest,
        crate::routes::ach::RecipientBody,
        crate::routes::ach::InitiateAchRequest,
        crate::routes::scheduler::SchedulerRunRequest,
        crate::routes::settings::UpdateSettingsRequest,
    )),
    tags(
        (name = "quote", description = "Checkout tax quotes"),
        (name = "remittances", description = "Remittance lifecycle and documents"),
        (name = "ach", description = "ACH funding, payment and reconciliation"),
        (name = "reports", description = "Period reports"),
        (name = "scheduler", description = "Scheduled remittance runs"),
        (name = "settings", description = "Tenant tax settings"),
    )
)]
pub struct ApiDoc;

/// Serves the OpenAPI JSON spec at `/openapi.json`.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
