//! # remit-api: Axum HTTP Service for Tax Remittance
//!
//! Exposes the remittance engine over HTTP: checkout quotes, the remittance
//! lifecycle, ACH funding and payment, the gateway webhook, reports, and
//! tenant tax settings.
//!
//! ## API Surface
//!
//! | Prefix                    | Module                     | Domain                 |
//! |---------------------------|----------------------------|------------------------|
//! | `/v1/tax/quote`           | [`routes::quote`]          | Checkout quotes        |
//! | `/v1/tax/remittances/*`   | [`routes::remittances`]    | Remittance lifecycle   |
//! | `/v1/tax/ach/*`           | [`routes::ach`]            | ACH funding & payment  |
//! | `/v1/tax/reports`         | [`routes::reports`]        | Period reports         |
//! | `/v1/tax/scheduler/run`   | [`routes::scheduler`]      | Scheduled runs         |
//! | `/v1/tax/settings/*`      | [`routes::settings`]       | Tenant settings        |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → AuthMiddleware → Handler
//! ```
//!
//! The ACH webhook and the health checks are mounted outside the auth
//! middleware. The webhook authenticates by HMAC signature.
//!
//! ## OpenAPI
//!
//! Generated via utoipa derive macros and served at `/openapi.json`.

pub mod auth;
pub mod db;
pub mod error;
pub mod extractors;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig::new(state.config.auth_token.clone());

    // Authenticated API routes.
    let api = Router::new()
        .merge(routes::quote::router())
        .merge(routes::remittances::router())
        .merge(routes::ach::router())
        .merge(routes::reports::router())
        .merge(routes::scheduler::router())
        .merge(routes::settings::router())
        .merge(openapi::router())
        .layer(from_fn(auth::auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(axum::Extension(auth_config))
        .with_state(state.clone());

    // Signature-authenticated gateway callback.
    let webhook = routes::ach::webhook_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    // Unauthenticated health checks.
    let health = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .with_state(state);

    Router::new().merge(health).merge(webhook).merge(api)
}

/// Liveness check: 200 whenever the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness check: 503 while a configured database is unreachable.
async fn readiness(State(state): State<AppState>) -> (StatusCode, &'static str) {
    let Some(pool) = &state.db_pool else {
        return (StatusCode::OK, "ready");
    };
    match sqlx::query("SELECT 1").execute(pool).await {
        Ok(_) => (StatusCode::OK, "ready"),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed: database unreachable");
            (StatusCode::SERVICE_UNAVAILABLE, "database unavailable")
        }
    }
}
