//! # remit-cli: Operator Tooling for the Remittance Engine
//!
//! Provides the `remit` command-line interface. Everything here runs
//! offline against the engine's pure components; nothing talks to the
//! database or the ACH gateway.
//!
//! ## Subcommands
//!
//! - `remit quote`: builtin flat-rate quote for a cart total.
//! - `remit period`: boundaries of the current or previous filing period.
//! - `remit keys`: generate and check `ACCOUNT_SEALING_KEYS` entries.
//! - `remit webhook`: sign or verify a gateway webhook body.
//!
//! ```bash
//! remit quote --subtotal 10.00 --shipping 5.00 --rate 0.0825
//! remit period --schedule quarterly --date 2024-05-10 --previous
//! remit keys generate --kid k2
//! remit webhook sign --secret-env REMITIAN_WEBHOOK_SECRET payload.json
//! ```

pub mod keys;
pub mod period;
pub mod quote;
pub mod webhook;

use std::path::Path;

use anyhow::{Context, Result};
use zeroize::Zeroizing;

/// Read a secret from the named environment variable.
pub(crate) fn secret_from_env(var: &str) -> Result<Zeroizing<String>> {
    let value = std::env::var(var)
        .map(Zeroizing::new)
        .with_context(|| format!("environment variable {var} is not set"))?;
    if value.trim().is_empty() {
        anyhow::bail!("environment variable {var} is empty");
    }
    Ok(value)
}

/// Read a file as raw bytes, or stdin when the path is `-`.
pub(crate) fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        std::io::Read::read_to_end(&mut std::io::stdin(), &mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}
