//! Report projections of remittances and periods.

use std::fmt::Write as _;
use std::io;
use std::sync::Arc;

use csv::WriterBuilder;
use serde::Serialize;

use remit_core::{Cents, RemittanceId, RemittancePeriod, TenantId};
use remit_state::{
    JurisdictionTotal, RemittanceMethod, RemittanceStatus, TaxAchPayment, TaxRemittance,
};

use crate::aggregate::RemittanceAggregator;
use crate::error::EngineError;
use crate::store::{OrderSource, RemittanceStore};

/// One remittance inside a [`PeriodReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemittanceSummary {
    pub id: RemittanceId,
    pub period: RemittancePeriod,
    pub status: RemittanceStatus,
    pub method: RemittanceMethod,
    pub total_tax_collected: Cents,
    pub total_remitted: Cents,
}

/// Orders and remittances of a tenant over an arbitrary period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodReport {
    pub tenant_id: TenantId,
    pub period: RemittancePeriod,
    pub total_sales: Cents,
    pub total_tax_collected: Cents,
    pub order_count: u64,
    pub breakdown: Vec<JurisdictionTotal>,
    pub remittances: Vec<RemittanceSummary>,
    pub total_remitted: Cents,
}

#[derive(Clone)]
pub struct ReportGenerator {
    store: Arc<dyn RemittanceStore>,
    aggregator: RemittanceAggregator,
}

impl ReportGenerator {
    pub fn new(store: Arc<dyn RemittanceStore>, orders: Arc<dyn OrderSource>) -> Self {
        Self {
            store,
            aggregator: RemittanceAggregator::new(orders),
        }
    }

    pub async fn period_report(
        &self,
        tenant_id: TenantId,
        period: RemittancePeriod,
    ) -> Result<PeriodReport, EngineError> {
        let summary = self.aggregator.aggregate(tenant_id, &period).await?;
        let remittances: Vec<RemittanceSummary> = self
            .store
            .remittances_overlapping(tenant_id, &period)
            .await?
            .into_iter()
            .map(|r| RemittanceSummary {
                id: r.id,
                period: r.period,
                status: r.status,
                method: r.method,
                total_tax_collected: r.total_tax_collected,
                total_remitted: r.total_tax_remitted,
            })
            .collect();
        let total_remitted = remittances.iter().map(|r| r.total_remitted).sum();

        Ok(PeriodReport {
            tenant_id,
            period,
            total_sales: summary.total_sales,
            total_tax_collected: summary.total_tax_collected,
            order_count: summary.order_count,
            breakdown: summary.breakdown,
            remittances,
            total_remitted,
        })
    }

    /// CSV document: a preamble of single-field records, then the
    /// jurisdiction breakdown table.
    pub fn remittance_csv(
        remittance: &TaxRemittance,
        tenant_name: &str,
    ) -> Result<String, csv::Error> {
        let mut writer = WriterBuilder::new().flexible(true).from_writer(Vec::new());
        writer.write_record(["Tax Remittance Report"])?;
        writer.write_record([format!("Tenant: {tenant_name}")])?;
        writer.write_record([format!(
            "Period: {} - {}",
            remittance.period.start(),
            remittance.period.end()
        )])?;
        writer.write_record([format!(
            "Total Tax Collected: ${}",
            remittance.total_tax_collected
        )])?;
        writer.write_record(["Jurisdiction Breakdown:"])?;
        writer.write_record(["Jurisdiction", "Tax Amount", "Order Count"])?;
        for j in &remittance.report_data.breakdown {
            writer.write_record([
                j.jurisdiction.clone(),
                format!("${}", j.tax_amount),
                j.order_count.to_string(),
            ])?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))?;
        String::from_utf8(bytes)
            .map_err(|e| csv::Error::from(io::Error::new(io::ErrorKind::InvalidData, e)))
    }

    /// Standalone HTML document for download or printing.
    pub fn remittance_html(
        remittance: &TaxRemittance,
        tenant_name: &str,
        payments: &[TaxAchPayment],
    ) -> String {
        let outstanding = remittance.amount_due();
        let mut rows = String::new();
        for j in &remittance.report_data.breakdown {
            let _ = write!(
                rows,
                "<tr><td>{}</td><td class=\"amount\">{}</td><td class=\"amount\">${}</td></tr>",
                escape_html(&j.jurisdiction),
                j.order_count,
                j.tax_amount
            );
        }
        let _ = write!(
            rows,
            "<tr class=\"total\"><td>TOTAL</td><td class=\"amount\">{}</td><td class=\"amount\">${}</td></tr>",
            remittance.report_data.order_count, remittance.total_tax_collected
        );

        let mut payment_rows = String::new();
        for p in payments {
            let _ = write!(
                payment_rows,
                "<tr><td>{}</td><td>{}</td><td>{} (****{})</td><td class=\"amount\">${}</td><td>{}</td></tr>",
                escape_html(p.external_payment_id.as_ref().map(|e| e.as_str()).unwrap_or("-")),
                p.status.as_str(),
                escape_html(&p.recipient.name),
                escape_html(&p.recipient.account_last4),
                p.amount,
                escape_html(p.confirmation_number.as_deref().unwrap_or("-")),
            );
        }
        let payments_section = if payment_rows.is_empty() {
            String::new()
        } else {
            format!(
                "<h2>ACH Payments</h2><table><thead><tr><th>Payment</th><th>Status</th>\
                 <th>Recipient</th><th>Amount</th><th>Confirmation</th></tr></thead>\
                 <tbody>{payment_rows}</tbody></table>"
            )
        };

        let remitted_on = remittance
            .remittance_date
            .map(|d| d.date_naive().to_string())
            .unwrap_or_else(|| "-".to_string());
        let reference = remittance.remittance_reference.as_deref().unwrap_or("-");
        let notes = remittance
            .notes
            .as_deref()
            .map(|n| format!("<p><strong>Notes:</strong> {}</p>", escape_html(n)))
            .unwrap_or_default();

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Tax Remittance Report - {tenant}</title>
<style>
body {{ font-family: Arial, sans-serif; font-size: 11pt; margin: 40px; }}
table {{ width: 100%; border-collapse: collapse; margin: 16px 0; }}
th, td {{ border-bottom: 1px solid #ddd; padding: 6px; text-align: left; }}
.amount {{ text-align: right; }}
.total {{ background: #f0f0f0; font-weight: bold; }}
.footer {{ margin-top: 40px; font-size: 9pt; color: #666; }}
</style>
</head>
<body>
<h1>Tax Remittance Report</h1>
<p>Period: {start} - {end}</p>
<p><strong>Business Name:</strong> {tenant}</p>
<h2>Summary</h2>
<p>Status: {status}</p>
<p>Method: {method}</p>
<p>Total Tax Collected: ${collected}</p>
<p>Total Tax Remitted: ${remitted}</p>
<p>Outstanding: ${outstanding}</p>
<p>Remittance Date: {remitted_on}</p>
<p>Reference: {reference}</p>
{notes}
<h2>Tax by Jurisdiction</h2>
<table>
<thead><tr><th>Jurisdiction</th><th>Orders</th><th>Tax Amount</th></tr></thead>
<tbody>{rows}</tbody>
</table>
{payments_section}
<div class="footer">
<p>Remittance {id}, created {created}</p>
<p>This report is for informational purposes only. Consult a tax professional for filing requirements.</p>
</div>
</body>
</html>
"#,
            tenant = escape_html(tenant_name),
            start = remittance.period.start(),
            end = remittance.period.end(),
            status = remittance.status,
            method = remittance.method.as_str(),
            collected = remittance.total_tax_collected,
            remitted = remittance.total_tax_remitted,
            outstanding = outstanding,
            remitted_on = remitted_on,
            reference = escape_html(reference),
            notes = notes,
            rows = rows,
            payments_section = payments_section,
            id = remittance.id,
            created = remittance.created_at.to_rfc3339(),
        )
    }
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OrderRecord;
    use crate::store::{MemoryOrderSource, MemoryRemittanceStore};
    use chrono::{TimeZone, Utc};
    use remit_core::OrderId;
    use remit_state::ReportData;

    fn remittance() -> TaxRemittance {
        TaxRemittance::new(
            TenantId::new(),
            RemittancePeriod::monthly(2024, 1).unwrap(),
            RemittanceMethod::Manual,
            Cents::new(2_310),
            ReportData {
                breakdown: vec![
                    JurisdictionTotal {
                        jurisdiction: "CA".into(),
                        tax_amount: Cents::new(800),
                        order_count: 1,
                    },
                    JurisdictionTotal {
                        jurisdiction: "Austin, TX".into(),
                        tax_amount: Cents::new(1_510),
                        order_count: 2,
                    },
                ],
                order_count: 3,
            },
        )
    }

    #[test]
    fn csv_layout() {
        let csv = ReportGenerator::remittance_csv(&remittance(), "Taco Truck").unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Tax Remittance Report",
                "Tenant: Taco Truck",
                "Period: 2024-01-01 - 2024-01-31",
                "Total Tax Collected: $23.10",
                "Jurisdiction Breakdown:",
                "Jurisdiction,Tax Amount,Order Count",
                "CA,$8.00,1",
                "\"Austin, TX\",$15.10,2",
            ]
        );
    }

    #[test]
    fn csv_quotes_separators_quotes_and_line_breaks() {
        let mut r = remittance();
        r.report_data.breakdown[0].jurisdiction = "Travis\r\nCounty, \"TX\"".into();
        let csv = ReportGenerator::remittance_csv(&r, "Tacos, \"Inc\"\r\nAustin").unwrap();

        let records: Vec<csv::StringRecord> = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(csv.as_bytes())
            .records()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records.len(), 8);
        assert_eq!(&records[1][0], "Tenant: Tacos, \"Inc\"\r\nAustin");
        assert_eq!(records[1].len(), 1);
        assert_eq!(&records[6][0], "Travis\r\nCounty, \"TX\"");
        assert_eq!(&records[6][1], "$8.00");
        assert_eq!(&records[6][2], "1");
        assert_eq!(&records[7][0], "Austin, TX");
    }

    #[test]
    fn html_escapes_and_includes_status() {
        let mut r = remittance();
        r.attest_manual("<CHK-1>").unwrap();
        let html = ReportGenerator::remittance_html(&r, "Tom & Jerry's", &[]);
        assert!(html.contains("Tom &amp; Jerry&#39;s"));
        assert!(html.contains("Reference: &lt;CHK-1&gt;"));
        assert!(html.contains("Status: completed"));
        assert!(html.contains("Total Tax Remitted: $23.10"));
        assert!(!html.contains("ACH Payments"));
    }

    #[tokio::test]
    async fn period_report_sums_sales_and_remittances() {
        let tenant = TenantId::new();
        let orders = Arc::new(MemoryOrderSource::new());
        for (tax, total) in [(825, 10_825), (175, 2_175)] {
            orders.insert_order(OrderRecord {
                id: OrderId::new(),
                tenant_id: tenant,
                tax_amount: Cents::new(tax),
                total_amount: Cents::new(total),
                status: "completed".into(),
                created_at: Utc.with_ymd_and_hms(2024, 3, 5, 8, 0, 0).unwrap(),
                jurisdiction: None,
            });
        }
        let store = Arc::new(MemoryRemittanceStore::new());
        let mut march = TaxRemittance::new(
            tenant,
            RemittancePeriod::monthly(2024, 3).unwrap(),
            RemittanceMethod::Manual,
            Cents::new(1_000),
            ReportData::default(),
        );
        march.attest_manual("REF").unwrap();
        store.insert_remittance_if_absent(march).await.unwrap();

        let report = ReportGenerator::new(store, orders)
            .period_report(tenant, RemittancePeriod::quarterly(2024, 1).unwrap())
            .await
            .unwrap();
        assert_eq!(report.total_sales, Cents::new(13_000));
        assert_eq!(report.total_tax_collected, Cents::new(1_000));
        assert_eq!(report.order_count, 2);
        assert_eq!(report.remittances.len(), 1);
        assert_eq!(report.total_remitted, Cents::new(1_000));
    }
}
