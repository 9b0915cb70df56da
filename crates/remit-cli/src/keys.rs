//! # Keys Subcommand
//!
//! Manages the `kid:hex` keyring used to seal bank account numbers at rest.
//! Rotation is additive: prepend a new entry to `ACCOUNT_SEALING_KEYS`,
//! keep the old ones so existing envelopes still open, and reseal stored
//! values at leisure.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use remit_core::SealedSecret;
use remit_crypto::{generate_key_entry, AccountSealer};

/// Arguments for `remit keys`.
#[derive(Args, Debug)]
pub struct KeysArgs {
    #[command(subcommand)]
    pub command: KeysCommand,
}

#[derive(Subcommand, Debug)]
pub enum KeysCommand {
    /// Print a fresh keyring entry.
    Generate {
        /// Key id, 1-32 chars of [A-Za-z0-9_-].
        #[arg(long)]
        kid: String,
    },

    /// Parse the keyring and confirm it can seal and unseal.
    Check {
        /// Environment variable holding the keyring.
        #[arg(long, default_value = "ACCOUNT_SEALING_KEYS")]
        keyring_env: String,
    },

    /// Re-seal stored envelopes under the active key.
    Reseal {
        #[arg(long, default_value = "ACCOUNT_SEALING_KEYS")]
        keyring_env: String,

        /// Sealed values (`v1:{kid}:{hex}`).
        #[arg(value_name = "ENVELOPE", required = true)]
        values: Vec<String>,
    },
}

/// Execute the keys subcommand.
pub fn run_keys(args: &KeysArgs) -> Result<u8> {
    match &args.command {
        KeysCommand::Generate { kid } => {
            println!("{}", generate_key_entry(kid)?);
            Ok(0)
        }
        KeysCommand::Check { keyring_env } => {
            let sealer = load(keyring_env)?;
            self_test(&sealer)?;
            println!("OK: keyring parsed, active key {}", sealer.active_kid());
            Ok(0)
        }
        KeysCommand::Reseal {
            keyring_env,
            values,
        } => {
            let sealer = load(keyring_env)?;
            for value in values {
                println!("{}", reseal(&sealer, value)?);
            }
            Ok(0)
        }
    }
}

fn load(var: &str) -> Result<AccountSealer> {
    let spec = crate::secret_from_env(var)?;
    AccountSealer::from_keyring(&spec).with_context(|| format!("parsing {var}"))
}

fn self_test(sealer: &AccountSealer) -> Result<()> {
    let sealed = sealer.seal("000123456789")?;
    let opened = sealer.unseal(&sealed)?;
    anyhow::ensure!(opened.as_str() == "000123456789", "round trip mismatch");
    Ok(())
}

/// Unchanged when already under the active key.
fn reseal(sealer: &AccountSealer, value: &str) -> Result<String> {
    let sealed = SealedSecret::from_stored(value.trim());
    if !sealer.needs_reseal(&sealed) {
        return Ok(sealed.as_str().to_string());
    }
    let clear = sealer.unseal(&sealed)?;
    tracing::info!(active = sealer.active_kid(), "resealing envelope");
    Ok(sealer.seal(&clear)?.as_str().to_string())
}
