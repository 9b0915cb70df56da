//! # remit CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use remit_cli::keys::{run_keys, KeysArgs};
use remit_cli::period::{run_period, PeriodArgs};
use remit_cli::quote::{run_quote, QuoteArgs};
use remit_cli::webhook::{run_webhook, WebhookArgs};

/// Tax remittance operator tooling.
#[derive(Parser, Debug)]
#[command(name = "remit", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compute a builtin flat-rate quote.
    Quote(QuoteArgs),

    /// Show filing period boundaries for a date.
    Period(PeriodArgs),

    /// Account sealing keyring management.
    Keys(KeysArgs),

    /// Sign or verify a gateway webhook body.
    Webhook(WebhookArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Quote(args) => run_quote(&args),
        Commands::Period(args) => run_period(&args),
        Commands::Keys(args) => run_keys(&args),
        Commands::Webhook(args) => run_webhook(&args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
