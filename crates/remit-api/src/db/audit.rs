//! Audit event persistence as a per-tenant hash chain.
//!
//! Each row stores the digest of its predecessor and its own digest from
//! [`chain_digest`], so a rewritten or deleted row breaks the chain.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use remit_engine::audit::chain_digest;
use remit_engine::{AuditEvent, AuditSink};

pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn append(&self, event: &AuditEvent) -> Result<Uuid, sqlx::Error> {
        let id = Uuid::new_v4();
        let tenant = *event.tenant_id.as_uuid();
        let mut tx = self.pool.begin().await?;

        // One appender per tenant chain at a time.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("audit:{tenant}"))
            .execute(&mut *tx)
            .await?;

        let previous_hash: Option<String> = sqlx::query_scalar(
            "SELECT event_hash FROM audit_events
             WHERE tenant_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(tenant)
        .fetch_optional(&mut *tx)
        .await?;

        let event_hash = chain_digest(previous_hash.as_deref(), event);

        sqlx::query(
            "INSERT INTO audit_events (id, tenant_id, event, resource_id, payload,
             previous_hash, event_hash, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(id)
        .bind(tenant)
        .bind(&event.event)
        .bind(&event.resource_id)
        .bind(&event.payload)
        .bind(&previous_hash)
        .bind(&event_hash)
        .bind(event.at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(id)
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<(), String> {
        self.append(&event).await.map(|_| ()).map_err(|e| e.to_string())
    }
}
