//! Read-only access to the storefront's `orders` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use remit_core::{Cents, OrderId, TenantId};
use remit_engine::{OrderRecord, OrderSource, StoreError};

use super::backend;

pub struct PgOrderSource {
    pool: PgPool,
}

impl PgOrderSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderSource for PgOrderSource {
    async fn orders_in_range(
        &self,
        tenant_id: TenantId,
        start: DateTime<Utc>,
        end_exclusive: DateTime<Utc>,
    ) -> Result<Vec<OrderRecord>, StoreError> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT id, tenant_id, tax_amount, total_amount, status, jurisdiction, created_at
             FROM orders
             WHERE tenant_id = $1 AND created_at >= $2 AND created_at < $3
             ORDER BY created_at",
        )
        .bind(*tenant_id.as_uuid())
        .bind(start)
        .bind(end_exclusive)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows.into_iter().map(OrderRow::into_record).collect())
    }
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    tenant_id: Uuid,
    tax_amount: i64,
    total_amount: i64,
    status: String,
    jurisdiction: Option<String>,
    created_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_record(self) -> OrderRecord {
        OrderRecord {
            id: OrderId::from_uuid(self.id),
            tenant_id: TenantId::from_uuid(self.tenant_id),
            tax_amount: Cents::new(self.tax_amount),
            total_amount: Cents::new(self.total_amount),
            status: self.status,
            created_at: self.created_at,
            jurisdiction: self.jurisdiction,
        }
    }
}
