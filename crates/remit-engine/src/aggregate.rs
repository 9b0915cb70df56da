//! Tax collected per tenant and period.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use remit_core::{Cents, RemittancePeriod, TenantId};
use remit_state::{JurisdictionTotal, ReportData};

use crate::error::StoreError;
use crate::model::OrderRecord;
use crate::store::OrderSource;

/// Jurisdiction label for orders without one.
pub const UNKNOWN_JURISDICTION: &str = "Unknown";

/// Totals over the non-cancelled orders of a period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSummary {
    pub total_tax_collected: Cents,
    /// Sum of order totals, tax included.
    pub total_sales: Cents,
    pub order_count: u64,
    /// Sorted by jurisdiction.
    pub breakdown: Vec<JurisdictionTotal>,
}

impl AggregateSummary {
    pub fn report_data(&self) -> ReportData {
        ReportData {
            breakdown: self.breakdown.clone(),
            order_count: self.order_count,
        }
    }
}

#[derive(Clone)]
pub struct RemittanceAggregator {
    orders: Arc<dyn OrderSource>,
}

impl RemittanceAggregator {
    pub fn new(orders: Arc<dyn OrderSource>) -> Self {
        Self { orders }
    }

    pub async fn aggregate(
        &self,
        tenant_id: TenantId,
        period: &RemittancePeriod,
    ) -> Result<AggregateSummary, StoreError> {
        let orders = self
            .orders
            .orders_in_range(tenant_id, period.start_of_day(), period.end_exclusive())
            .await?;
        Ok(summarize(period, &orders))
    }
}

fn summarize(period: &RemittancePeriod, orders: &[OrderRecord]) -> AggregateSummary {
    let mut summary = AggregateSummary::default();
    let mut by_jurisdiction: BTreeMap<String, (Cents, u64)> = BTreeMap::new();

    for order in orders
        .iter()
        .filter(|o| !o.is_cancelled() && period.contains(&o.created_at))
    {
        summary.total_tax_collected += order.tax_amount;
        summary.total_sales += order.total_amount;
        summary.order_count += 1;

        let key = order
            .jurisdiction
            .as_deref()
            .map(str::trim)
            .filter(|j| !j.is_empty())
            .unwrap_or(UNKNOWN_JURISDICTION)
            .to_string();
        let entry = by_jurisdiction.entry(key).or_insert((Cents::ZERO, 0));
        entry.0 += order.tax_amount;
        entry.1 += 1;
    }

    summary.breakdown = by_jurisdiction
        .into_iter()
        .map(|(jurisdiction, (tax_amount, order_count))| JurisdictionTotal {
            jurisdiction,
            tax_amount,
            order_count,
        })
        .collect();
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryOrderSource;
    use chrono::{TimeZone, Utc};
    use remit_core::OrderId;

    fn order(
        tenant: TenantId,
        tax: i64,
        status: &str,
        day: u32,
        jurisdiction: Option<&str>,
    ) -> OrderRecord {
        OrderRecord {
            id: OrderId::new(),
            tenant_id: tenant,
            tax_amount: Cents::new(tax),
            total_amount: Cents::new(tax * 10),
            status: status.into(),
            created_at: Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap(),
            jurisdiction: jurisdiction.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn excludes_cancelled_and_groups_by_jurisdiction() {
        let tenant = TenantId::new();
        let source = Arc::new(MemoryOrderSource::new());
        source.insert_order(order(tenant, 1_250, "completed", 3, Some("TX")));
        source.insert_order(order(tenant, 800, "completed", 10, Some("CA")));
        source.insert_order(order(tenant, 260, "paid", 31, None));
        source.insert_order(order(tenant, 999, "cancelled", 15, Some("CA")));
        source.insert_order(order(TenantId::new(), 5_000, "completed", 15, Some("CA")));

        let summary = RemittanceAggregator::new(source)
            .aggregate(tenant, &RemittancePeriod::monthly(2024, 1).unwrap())
            .await
            .unwrap();

        assert_eq!(summary.total_tax_collected, Cents::new(2_310));
        assert_eq!(summary.order_count, 3);
        let names: Vec<_> = summary
            .breakdown
            .iter()
            .map(|j| j.jurisdiction.as_str())
            .collect();
        assert_eq!(names, vec!["CA", "TX", "Unknown"]);
        assert_eq!(summary.report_data().order_count, 3);
    }

    #[tokio::test]
    async fn empty_period_is_zero() {
        let summary = RemittanceAggregator::new(Arc::new(MemoryOrderSource::new()))
            .aggregate(TenantId::new(), &RemittancePeriod::monthly(2024, 2).unwrap())
            .await
            .unwrap();
        assert_eq!(summary, AggregateSummary::default());
    }
}
