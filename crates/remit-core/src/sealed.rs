//! Opaque at-rest ciphertext for bank routing and account numbers.
//!
//! The envelope format and the keys live in `remit-crypto`. This type only
//! guarantees that sealed values never show up in `Debug` output or logs.

use serde::{Deserialize, Serialize};

/// A sealed (encrypted) secret as stored in the database.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SealedSecret(String);

impl SealedSecret {
    /// Wrap an envelope string read back from storage.
    pub fn from_stored(envelope: impl Into<String>) -> Self {
        Self(envelope.into())
    }

    /// The envelope string for persistence.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SealedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SealedSecret([REDACTED])")
    }
}

/// Last four characters of an account number, for display.
pub fn last4(account_number: &str) -> String {
    let digits: Vec<char> = account_number.chars().filter(|c| !c.is_whitespace()).collect();
    let start = digits.len().saturating_sub(4);
    digits[start..].iter().collect()
}
