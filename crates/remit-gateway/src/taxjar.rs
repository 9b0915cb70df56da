//! Typed client for a TaxJar-compatible sales tax API.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | POST   | `/v2/taxes` | Tax for an order |
//!
//! TaxJar speaks decimal dollars as JSON numbers. Conversion to and from
//! [`Cents`](remit_core::Cents) happens in the provider adapter, once.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::TaxApiConfig;
use crate::error::TaxApiError;

/// One line item in a tax request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaxJarLineItem {
    pub id: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub discount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_tax_code: Option<String>,
}

/// `POST /v2/taxes` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaxJarRequest {
    pub from_country: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_zip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_street: Option<String>,
    pub to_country: String,
    pub to_zip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_street: Option<String>,
    pub amount: f64,
    pub shipping: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nexus_addresses: Option<Vec<serde_json::Value>>,
    pub line_items: Vec<TaxJarLineItem>,
}

/// Per-level amounts in `tax.breakdown`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TaxJarBreakdown {
    #[serde(default)]
    pub state_tax_collectable: Option<f64>,
    #[serde(default)]
    pub county_tax_collectable: Option<f64>,
    #[serde(default)]
    pub city_tax_collectable: Option<f64>,
    #[serde(default)]
    pub special_district_tax_collectable: Option<f64>,
    #[serde(default)]
    pub combined_tax_rate: Option<f64>,
}

/// Jurisdiction names in `tax.jurisdictions`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TaxJarJurisdictions {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub county: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

/// The `tax` object of a `/v2/taxes` response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TaxJarTax {
    #[serde(default)]
    pub amount_to_collect: Option<f64>,
    #[serde(default)]
    pub rate: Option<f64>,
    #[serde(default)]
    pub combined_tax_rate: Option<f64>,
    #[serde(default)]
    pub breakdown: Option<TaxJarBreakdown>,
    #[serde(default)]
    pub jurisdictions: Option<TaxJarJurisdictions>,
}

impl TaxJarTax {
    /// `rate`, else `combined_tax_rate`, else the breakdown's combined rate.
    pub fn effective_rate(&self) -> Option<f64> {
        self.rate
            .filter(|r| r.is_finite())
            .or(self.combined_tax_rate.filter(|r| r.is_finite()))
            .or_else(|| {
                self.breakdown
                    .as_ref()
                    .and_then(|b| b.combined_tax_rate)
                    .filter(|r| r.is_finite())
            })
    }
}

#[derive(Deserialize)]
struct TaxJarResponse {
    #[serde(default)]
    tax: TaxJarTax,
}

/// Client for `POST /v2/taxes`.
#[derive(Debug, Clone)]
pub struct TaxJarClient {
    http: reqwest::Client,
    base_url: String,
}

impl TaxJarClient {
    pub fn new(config: &TaxApiConfig) -> Result<Self, TaxApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TaxApiError::Http {
                endpoint: "client_init".into(),
                source: e,
            })?;
        Ok(Self {
            http,
            base_url: config.base_url.as_str().trim_end_matches('/').to_string(),
        })
    }

    /// Calls `POST {base_url}/v2/taxes` with a per-tenant bearer key.
    pub async fn calculate(
        &self,
        api_key: &str,
        req: &TaxJarRequest,
    ) -> Result<TaxJarTax, TaxApiError> {
        let endpoint = "POST /v2/taxes";
        let url = format!("{}/v2/taxes", self.base_url);

        let resp = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(req)
            .send()
            .await
            .map_err(|e| TaxApiError::Http {
                endpoint: endpoint.into(),
                source: e,
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read response body: {e}>"));
            return Err(TaxApiError::Status {
                endpoint: endpoint.into(),
                status,
                body,
            });
        }

        resp.json::<TaxJarResponse>()
            .await
            .map(|r| r.tax)
            .map_err(|e| TaxApiError::Deserialization {
                endpoint: endpoint.into(),
                source: e,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_rate_precedence() {
        let tax = TaxJarTax {
            rate: Some(0.0725),
            combined_tax_rate: Some(0.09),
            ..Default::default()
        };
        assert_eq!(tax.effective_rate(), Some(0.0725));

        let tax = TaxJarTax {
            combined_tax_rate: Some(0.09),
            ..Default::default()
        };
        assert_eq!(tax.effective_rate(), Some(0.09));

        let tax = TaxJarTax {
            breakdown: Some(TaxJarBreakdown {
                combined_tax_rate: Some(0.1),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(tax.effective_rate(), Some(0.1));
        assert_eq!(TaxJarTax::default().effective_rate(), None);
    }

    #[test]
    fn request_omits_absent_optionals() {
        let req = TaxJarRequest {
            from_country: "US".into(),
            from_zip: None,
            from_state: None,
            from_city: None,
            from_street: None,
            to_country: "US".into(),
            to_zip: "90002".into(),
            to_state: Some("CA".into()),
            to_city: None,
            to_street: None,
            amount: 10.0,
            shipping: 0.0,
            nexus_addresses: None,
            line_items: vec![],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("from_zip").is_none());
        assert_eq!(json["to_zip"], "90002");
    }
}
