//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers via
//! the `State` extractor. Holds the engine services wired over one set of
//! storage [`Backends`] and external [`Rails`].
//!
//! Storage is either in memory (default, tests) or Postgres when
//! `DATABASE_URL` is set. The ACH rail is the Remitian client when
//! `REMITIAN_API_KEY` is set and the in-process mock otherwise.

use std::sync::Arc;

use sqlx::PgPool;

use remit_crypto::AccountSealer;
use remit_engine::{
    AchReconciler, AuditSink, MemoryOrderSource, MemoryRemittanceStore, MemoryTenantDirectory,
    OrderSource, QuoteService, RemittanceLocks, RemittanceManager, RemittanceScheduler,
    RemittanceStore, ReportGenerator, TaxProvider, TenantDirectory, TracingAuditSink,
    UnimplementedProvider,
};
use remit_gateway::{AchGateway, MockAchGateway};

// -- Configuration ------------------------------------------------------------

/// Minutes a pending payment may sit before the sweep polls it.
pub const DEFAULT_STALE_MINUTES: i64 = 60;

/// Application configuration.
///
/// Custom `Debug` redacts the secrets.
#[derive(Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Static bearer token. If `None`, authentication is disabled.
    pub auth_token: Option<String>,
    /// Shared secret for ACH webhook signatures. If `None`, the webhook
    /// endpoint answers 503.
    pub webhook_secret: Option<String>,
    /// Age after which the reconciliation sweep polls a pending payment.
    pub stale_after_minutes: i64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("stale_after_minutes", &self.stale_after_minutes)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            webhook_secret: None,
            stale_after_minutes: DEFAULT_STALE_MINUTES,
        }
    }
}

impl AppConfig {
    /// Read `PORT`, `AUTH_TOKEN`, `REMITIAN_WEBHOOK_SECRET` and
    /// `RECONCILE_STALE_MINUTES`.
    pub fn from_env() -> Self {
        let non_empty = |var: &str| std::env::var(var).ok().filter(|v| !v.trim().is_empty());
        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            auth_token: non_empty("AUTH_TOKEN"),
            webhook_secret: non_empty("REMITIAN_WEBHOOK_SECRET"),
            stale_after_minutes: std::env::var("RECONCILE_STALE_MINUTES")
                .ok()
                .and_then(|m| m.parse().ok())
                .filter(|m: &i64| *m > 0)
                .unwrap_or(DEFAULT_STALE_MINUTES),
        }
    }
}

// -- Wiring -------------------------------------------------------------------

/// Storage implementations behind the engine's store traits.
#[derive(Clone)]
pub struct Backends {
    pub orders: Arc<dyn OrderSource>,
    pub directory: Arc<dyn TenantDirectory>,
    pub store: Arc<dyn RemittanceStore>,
    pub audit: Arc<dyn AuditSink>,
    /// Present when the backends are Postgres.
    pub db_pool: Option<PgPool>,
}

impl Backends {
    /// Empty in-memory stores with audit events going to the log.
    pub fn in_memory() -> Self {
        Self {
            orders: Arc::new(MemoryOrderSource::new()),
            directory: Arc::new(MemoryTenantDirectory::new()),
            store: Arc::new(MemoryRemittanceStore::new()),
            audit: Arc::new(TracingAuditSink),
            db_pool: None,
        }
    }

    /// Postgres-backed stores sharing one pool. `sealer` protects the
    /// recipient bank numbers kept in tenant settings.
    pub fn postgres(pool: PgPool, sealer: Arc<AccountSealer>) -> Self {
        Self {
            orders: Arc::new(crate::db::orders::PgOrderSource::new(pool.clone())),
            directory: Arc::new(crate::db::tenants::PgTenantDirectory::new(
                pool.clone(),
                sealer,
            )),
            store: Arc::new(crate::db::remittances::PgRemittanceStore::new(pool.clone())),
            audit: Arc::new(crate::db::audit::PgAuditSink::new(pool.clone())),
            db_pool: Some(pool),
        }
    }
}

/// External rails and key material.
#[derive(Clone)]
pub struct Rails {
    pub gateway: Arc<dyn AchGateway>,
    /// Serves tenants configured for an external tax provider.
    pub tax_provider: Arc<dyn TaxProvider>,
    pub sealer: Arc<AccountSealer>,
}

impl Rails {
    /// Mock ACH gateway, no external tax provider, throwaway sealing key.
    pub fn local() -> Self {
        Self {
            gateway: Arc::new(MockAchGateway::new()),
            tax_provider: Arc::new(UnimplementedProvider::new("taxjar")),
            sealer: Arc::new(AccountSealer::ephemeral()),
        }
    }
}

// -- Application State --------------------------------------------------------

/// Shared application state accessible to all route handlers.
///
/// Clone-friendly: every service is `Arc`-backed.
#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<dyn TenantDirectory>,
    pub store: Arc<dyn RemittanceStore>,
    pub quotes: Arc<QuoteService>,
    pub remittances: RemittanceManager,
    pub reconciler: Arc<AchReconciler>,
    pub scheduler: RemittanceScheduler,
    pub reports: ReportGenerator,
    pub db_pool: Option<PgPool>,
    pub config: AppConfig,
}

impl AppState {
    /// In-memory state with default configuration and local rails.
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    /// In-memory state with the given configuration and local rails.
    pub fn with_config(config: AppConfig) -> Self {
        Self::assemble(config, Backends::in_memory(), Rails::local())
    }

    /// Wire the engine services over `backends` and `rails`.
    pub fn assemble(config: AppConfig, backends: Backends, rails: Rails) -> Self {
        let locks = RemittanceLocks::new();
        let remittances = RemittanceManager::new(
            backends.store.clone(),
            backends.orders.clone(),
            backends.audit.clone(),
            locks.clone(),
        );
        let reconciler = Arc::new(AchReconciler::new(
            backends.store.clone(),
            backends.directory.clone(),
            rails.gateway,
            rails.sealer,
            backends.audit.clone(),
            locks,
        ));
        let scheduler = RemittanceScheduler::new(
            backends.directory.clone(),
            remittances.clone(),
            reconciler.clone(),
        );

        Self {
            directory: backends.directory,
            store: backends.store.clone(),
            quotes: Arc::new(QuoteService::new(rails.tax_provider, backends.audit)),
            remittances,
            reconciler,
            scheduler,
            reports: ReportGenerator::new(backends.store, backends.orders),
            db_pool: backends.db_pool,
            config,
        }
    }

    /// Age after which a pending payment is polled by the sweep.
    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.config.stale_after_minutes)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
