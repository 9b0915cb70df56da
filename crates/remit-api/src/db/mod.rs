//! # Database Persistence Layer
//!
//! Postgres implementations of the engine's storage traits via SQLx.
//!
//! The database is **optional**. When `DATABASE_URL` is set the service
//! reads orders and tenant settings from Postgres and persists remittances,
//! ACH payments and the audit chain there. When absent, everything lives in
//! memory (development and tests).
//!
//! Every status-changing write is conditional on the status that was read
//! (`UPDATE ... WHERE status = $n`), so two processes racing on the same
//! remittance cannot both apply.

pub mod audit;
pub mod orders;
pub mod remittances;
pub mod tenants;

use sqlx::postgres::{PgPool, PgPoolOptions};

use remit_engine::StoreError;

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` if `DATABASE_URL` is not set (in-memory-only mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool() -> Result<Option<PgPool>, sqlx::Error> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => url,
        _ => {
            tracing::warn!(
                "DATABASE_URL not set, running in-memory only mode. \
                 Remittances will not survive restarts."
            );
            return Ok(None);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}

pub(crate) fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

pub(crate) fn corrupt(what: &str, detail: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(format!("{what}: {detail}"))
}
