//! # Quote Subcommand
//!
//! Runs the builtin flat-rate calculator against a cart total, the same
//! computation the API falls back to when an external provider fails.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use remit_core::{Cents, TaxRate, TenantId};
use remit_engine::{BuiltinProvider, ProviderQuote, QuoteRequest, TenantTaxSettings};

/// Arguments for `remit quote`.
#[derive(Args, Debug)]
pub struct QuoteArgs {
    /// Cart subtotal in dollars, e.g. `10.00`.
    #[arg(long, value_parser = Cents::parse)]
    pub subtotal: Cents,

    #[arg(long, value_parser = Cents::parse, default_value = "0")]
    pub shipping: Cents,

    #[arg(long, value_parser = Cents::parse, default_value = "0")]
    pub surcharge: Cents,

    /// Rate as a decimal fraction. Defaults to 0.0825.
    #[arg(long, value_parser = TaxRate::parse)]
    pub rate: Option<TaxRate>,

    /// Exclude shipping from the taxable base.
    #[arg(long)]
    pub no_shipping_tax: bool,

    /// Exclude the surcharge from the taxable base.
    #[arg(long)]
    pub no_surcharge_tax: bool,

    /// Print JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct QuoteOutput {
    amount: Cents,
    rate: TaxRate,
    taxable_amount: Option<Cents>,
}

/// Execute the quote subcommand.
pub fn run_quote(args: &QuoteArgs) -> Result<u8> {
    let quote = compute(args);
    tracing::debug!(amount = %quote.amount, rate = %quote.rate, "computed builtin quote");

    if args.json {
        let out = QuoteOutput {
            amount: quote.amount,
            rate: quote.rate,
            taxable_amount: quote.breakdown.taxable_amount,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("Tax:     ${}", quote.amount);
        println!("Rate:    {}", quote.rate);
        if let Some(base) = quote.breakdown.taxable_amount {
            println!("Taxable: ${base}");
        }
    }
    Ok(0)
}

fn compute(args: &QuoteArgs) -> ProviderQuote {
    let mut settings = TenantTaxSettings::new(TenantId::new());
    settings.default_tax_rate = args.rate;
    settings.tax_config.shipping_taxable = !args.no_shipping_tax;
    settings.tax_config.surcharge_taxable = !args.no_surcharge_tax;

    let request = QuoteRequest {
        items: Vec::new(),
        subtotal: args.subtotal,
        shipping: args.shipping,
        surcharge: args.surcharge,
        destination: None,
    };
    BuiltinProvider.compute(&settings, &request)
}
