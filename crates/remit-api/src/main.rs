//! # remit-api: Binary Entry Point
//!
//! Starts the Axum HTTP server for the tax remittance API.
//!
//! Environment:
//! - `PORT`, `AUTH_TOKEN`, `REMITIAN_WEBHOOK_SECRET`, `RECONCILE_STALE_MINUTES`
//! - `DATABASE_URL` (optional; in-memory when absent)
//! - `REMITIAN_*` for the ACH gateway (mock gateway when absent)
//! - `TAXJAR_*` for the external tax provider
//! - `ACCOUNT_SEALING_KEYS` keyring for bank numbers at rest
//! - `RECONCILE_SWEEP_SECS` to run the reconciliation sweep in-process
//! - `LOG_FORMAT=json` for JSON logs

use std::sync::Arc;
use std::time::Duration;

use remit_api::state::{AppConfig, AppState, Backends, Rails};
use remit_crypto::AccountSealer;
use remit_engine::{ExternalApiProvider, TaxProvider, UnimplementedProvider};
use remit_gateway::{AchGateway, AchGatewayConfig, MockAchGateway, RemitianClient, TaxApiConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = AppConfig::from_env();
    tracing::info!(?config, "configuration loaded");
    if config.webhook_secret.is_none() {
        tracing::warn!("REMITIAN_WEBHOOK_SECRET not set; the ACH webhook will answer 503");
    }

    let sealer = Arc::new(match std::env::var("ACCOUNT_SEALING_KEYS") {
        Ok(spec) if !spec.trim().is_empty() => AccountSealer::from_keyring(&spec).map_err(|e| {
            tracing::error!("Invalid ACCOUNT_SEALING_KEYS: {e}");
            e
        })?,
        _ => {
            tracing::warn!(
                "ACCOUNT_SEALING_KEYS not set; using an ephemeral key. \
                 Sealed bank numbers will be unreadable after restart."
            );
            AccountSealer::ephemeral()
        }
    });

    let gateway: Arc<dyn AchGateway> = match AchGatewayConfig::from_env() {
        Ok(gateway_config) => {
            tracing::info!(environment = ?gateway_config.environment, "Remitian ACH gateway configured");
            Arc::new(RemitianClient::new(gateway_config).map_err(|e| {
                tracing::error!("Failed to create Remitian client: {e}");
                e
            })?)
        }
        Err(e) => {
            tracing::warn!("Remitian not configured: {e}. Using the mock ACH gateway.");
            Arc::new(MockAchGateway::new())
        }
    };

    let tax_provider: Arc<dyn TaxProvider> =
        match TaxApiConfig::from_env().map_err(|e| e.to_string()).and_then(|c| {
            ExternalApiProvider::new(&c).map_err(|e| e.to_string())
        }) {
            Ok(provider) => Arc::new(provider),
            Err(e) => {
                tracing::warn!("External tax provider unavailable: {e}. Quotes will use the builtin rate.");
                Arc::new(UnimplementedProvider::new("taxjar"))
            }
        };

    let db_pool = remit_api::db::init_pool().await.map_err(|e| {
        tracing::error!("Database initialization failed: {e}");
        e
    })?;
    let backends = match db_pool {
        Some(pool) => Backends::postgres(pool, sealer.clone()),
        None => Backends::in_memory(),
    };

    let port = config.port;
    let state = AppState::assemble(
        config,
        backends,
        Rails {
            gateway,
            tax_provider,
            sealer,
        },
    );

    if let Some(every) = sweep_interval() {
        spawn_sweep(state.clone(), every);
    }

    let app = remit_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("remit-api listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn sweep_interval() -> Option<Duration> {
    std::env::var("RECONCILE_SWEEP_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|s| *s > 0)
        .map(Duration::from_secs)
}

/// Poll stale pending payments periodically, for deployments without an
/// external cron calling `/v1/tax/ach/sweep`.
fn spawn_sweep(state: AppState, every: Duration) {
    tracing::info!(interval_secs = every.as_secs(), "reconciliation sweep enabled");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match state.reconciler.sweep(state.stale_after()).await {
                Ok(summary) if summary.examined > 0 => {
                    tracing::info!(
                        examined = summary.examined,
                        applied = summary.applied,
                        errors = summary.errors,
                        "reconciliation sweep finished"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "reconciliation sweep failed"),
            }
        }
    });
}
