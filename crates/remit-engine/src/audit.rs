//! # Audit Trail
//!
//! Every remittance and payment transition, and every quote fallback, emits
//! an [`AuditEvent`]. Recording is best-effort: a sink failure is logged at
//! `warn` and the operation that produced the event carries on.
//!
//! Persistent sinks chain events by digest: each stored row carries
//! `sha256(previous_digest || canonical_event)`, see [`chain_digest`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use remit_core::TenantId;

/// One audited occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub tenant_id: TenantId,
    /// Dotted event name, e.g. `remittance.completed`.
    pub event: String,
    pub resource_id: Option<String>,
    pub payload: serde_json::Value,
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        tenant_id: TenantId,
        event: &str,
        resource_id: Option<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            tenant_id,
            event: event.to_string(),
            resource_id,
            payload,
            at: Utc::now(),
        }
    }
}

/// Digest linking `event` to its predecessor in a persistent audit chain.
///
/// The genesis predecessor is the empty string.
pub fn chain_digest(previous: Option<&str>, event: &AuditEvent) -> String {
    let mut hasher = Sha256::new();
    hasher.update(previous.unwrap_or_default().as_bytes());
    hasher.update(b"\n");
    hasher.update(event.tenant_id.as_uuid().as_bytes());
    hasher.update(event.event.as_bytes());
    hasher.update(b"\n");
    hasher.update(event.resource_id.as_deref().unwrap_or_default().as_bytes());
    hasher.update(b"\n");
    // serde_json::Value maps are ordered, so this rendering is stable.
    hasher.update(event.payload.to_string().as_bytes());
    hasher.update(b"\n");
    hasher.update(event.at.to_rfc3339().as_bytes());
    hex::encode(hasher.finalize())
}

/// Destination for audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<(), String>;
}

/// Record `event`, logging instead of failing when the sink errors.
pub async fn emit(sink: &dyn AuditSink, event: AuditEvent) {
    let name = event.event.clone();
    let tenant_id = event.tenant_id;
    if let Err(e) = sink.record(event).await {
        tracing::warn!(
            tenant_id = %tenant_id,
            event = %name,
            error = %e,
            "failed to record audit event"
        );
    }
}

/// Writes events as structured `info` logs on the `audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<(), String> {
        tracing::info!(
            target: "audit",
            tenant_id = %event.tenant_id,
            event = %event.event,
            resource_id = event.resource_id.as_deref().unwrap_or(""),
            payload = %event.payload,
            "audit"
        );
        Ok(())
    }
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    /// Names of recorded events, in order.
    pub fn names(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.event.clone()).collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<(), String> {
        self.events.lock().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        async fn record(&self, _event: AuditEvent) -> Result<(), String> {
            Err("disk full".into())
        }
    }

    fn event(name: &str) -> AuditEvent {
        AuditEvent::new(
            TenantId::new(),
            name,
            Some("remittance:1".into()),
            serde_json::json!({"amount": "1.00"}),
        )
    }

    #[tokio::test]
    async fn memory_sink_keeps_order() {
        let sink = MemoryAuditSink::new();
        emit(&sink, event("remittance.created")).await;
        emit(&sink, event("remittance.completed")).await;
        assert_eq!(sink.names(), vec!["remittance.created", "remittance.completed"]);
    }

    #[tokio::test]
    async fn sink_failure_is_swallowed() {
        emit(&FailingSink, event("quote.fallback")).await;
    }

    #[test]
    fn digest_depends_on_predecessor_and_content() {
        let e = event("ach.payment_created");
        let genesis = chain_digest(None, &e);
        assert_eq!(genesis.len(), 64);
        assert_eq!(genesis, chain_digest(None, &e));
        assert_ne!(genesis, chain_digest(Some(&genesis), &e));

        let mut altered = e.clone();
        altered.payload = serde_json::json!({"amount": "2.00"});
        assert_ne!(genesis, chain_digest(None, &altered));
    }
}
