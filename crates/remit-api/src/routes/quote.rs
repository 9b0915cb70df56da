//! # Tax Quote API
//!
//! - **POST `/v1/tax/quote`**: tax for an order at checkout.
//!
//! Quoting never fails on provider trouble: the response names the provider
//! actually used and carries a warning when the builtin rate stood in.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;

use remit_core::{Cents, TenantId};
use remit_engine::{Address, QuoteItem, QuoteRequest, TaxQuote};

use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::state::AppState;

/// Request body for a tax quote.
#[derive(Debug, Deserialize, ToSchema)]
pub struct QuoteBody {
    #[schema(value_type = String)]
    pub tenant_id: TenantId,
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub items: Vec<QuoteItem>,
    /// Order subtotal in dollars, as a decimal string or number.
    #[schema(value_type = String, example = "10.00")]
    pub subtotal: Cents,
    #[serde(default)]
    #[schema(value_type = String)]
    pub shipping: Cents,
    #[serde(default)]
    #[schema(value_type = String)]
    pub surcharge: Cents,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub destination: Option<Address>,
}

impl Validate for QuoteBody {
    fn validate(&self) -> Result<(), String> {
        for (name, amount) in [
            ("subtotal", self.subtotal),
            ("shipping", self.shipping),
            ("surcharge", self.surcharge),
        ] {
            if amount.is_negative() {
                return Err(format!("{name} must not be negative"));
            }
        }
        for item in &self.items {
            if item.quantity == 0 {
                return Err(format!("item {} must have a positive quantity", item.id));
            }
            if item.unit_price.is_negative() {
                return Err(format!("item {} has a negative unit price", item.id));
            }
        }
        Ok(())
    }
}

impl QuoteBody {
    fn into_request(self) -> QuoteRequest {
        QuoteRequest {
            items: self.items,
            subtotal: self.subtotal,
            shipping: self.shipping,
            surcharge: self.surcharge,
            destination: self.destination,
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/tax/quote", post(get_quote))
}

/// POST /v1/tax/quote
#[utoipa::path(
    post,
    path = "/v1/tax/quote",
    request_body = QuoteBody,
    responses(
        (status = 200, description = "Tax quote; provider_used is builtin when the configured provider fell back"),
        (status = 400, description = "Malformed JSON", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid amounts", body = crate::error::ErrorBody),
    ),
    tag = "quote"
)]
pub async fn get_quote(
    State(state): State<AppState>,
    body: Result<Json<QuoteBody>, JsonRejection>,
) -> Result<Json<TaxQuote>, AppError> {
    let body = extract_validated_json(body)?;
    let settings = super::tenant_settings(&state, body.tenant_id).await?;
    let quote = state.quotes.get_quote(&settings, &body.into_request()).await;
    Ok(Json(quote))
}
