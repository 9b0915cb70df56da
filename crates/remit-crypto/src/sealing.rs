//! # Account Sealing: AES-256-GCM Keyring
//!
//! Routing and account numbers are stored as envelopes of the form
//!
//! ```text
//! v1:{kid}:{hex(nonce || ciphertext || tag)}
//! ```
//!
//! with a fresh random 96-bit nonce per seal. The keyring is configured as a
//! comma-separated list of `kid:hex` entries (64 hex chars per key). The
//! first entry is the active sealing key; the rest only unseal.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use rand_core::{OsRng, RngCore};
use remit_core::SealedSecret;
use zeroize::Zeroizing;

use crate::error::CryptoError;

const ENVELOPE_VERSION: &str = "v1";
const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;

struct SealingKey {
    kid: String,
    material: Zeroizing<[u8; KEY_SIZE]>,
}

impl SealingKey {
    fn cipher(&self) -> Result<Aes256Gcm, CryptoError> {
        Aes256Gcm::new_from_slice(self.material.as_slice())
            .map_err(|_| CryptoError::InvalidKeyring(format!("key {:?} has bad length", self.kid)))
    }
}

/// AES-256-GCM keyring for bank account numbers.
pub struct AccountSealer {
    keys: Vec<SealingKey>,
}

impl std::fmt::Debug for AccountSealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kids: Vec<&str> = self.keys.iter().map(|k| k.kid.as_str()).collect();
        f.debug_struct("AccountSealer")
            .field("key_ids", &kids)
            .finish()
    }
}

impl AccountSealer {
    /// Parse a keyring spec such as `"k2:<hex>,k1:<hex>"`.
    pub fn from_keyring(spec: &str) -> Result<Self, CryptoError> {
        let mut keys: Vec<SealingKey> = Vec::new();
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (kid, hex_key) = entry.split_once(':').ok_or_else(|| {
                CryptoError::InvalidKeyring("entries must be kid:hex".to_string())
            })?;
            validate_kid(kid)?;
            if keys.iter().any(|k| k.kid == kid) {
                return Err(CryptoError::InvalidKeyring(format!("duplicate key id {kid:?}")));
            }
            let decoded = Zeroizing::new(
                hex::decode(hex_key.trim())
                    .map_err(|_| CryptoError::InvalidKeyring(format!("key {kid:?} is not hex")))?,
            );
            if decoded.len() != KEY_SIZE {
                return Err(CryptoError::InvalidKeyring(format!(
                    "key {kid:?} must be {KEY_SIZE} bytes, got {}",
                    decoded.len()
                )));
            }
            let mut material = Zeroizing::new([0u8; KEY_SIZE]);
            material.copy_from_slice(&decoded);
            keys.push(SealingKey {
                kid: kid.to_string(),
                material,
            });
        }
        if keys.is_empty() {
            return Err(CryptoError::InvalidKeyring("no keys configured".to_string()));
        }
        Ok(Self { keys })
    }

    /// A single random key, for local development only. Anything sealed with
    /// it is unreadable after restart.
    pub fn ephemeral() -> Self {
        let mut material = Zeroizing::new([0u8; KEY_SIZE]);
        OsRng.fill_bytes(material.as_mut_slice());
        Self {
            keys: vec![SealingKey {
                kid: "ephemeral".to_string(),
                material,
            }],
        }
    }

    /// Id of the key new envelopes are sealed under.
    pub fn active_kid(&self) -> &str {
        // from_keyring rejects empty keyrings and ephemeral() always has one key.
        self.keys.first().map(|k| k.kid.as_str()).unwrap_or_default()
    }

    /// Encrypt `plaintext` under the active key.
    pub fn seal(&self, plaintext: &str) -> Result<SealedSecret, CryptoError> {
        let key = self
            .keys
            .first()
            .ok_or_else(|| CryptoError::InvalidKeyring("no keys configured".to_string()))?;
        let cipher = key.cipher()?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(SealedSecret::from_stored(format!(
            "{ENVELOPE_VERSION}:{}:{}",
            key.kid,
            hex::encode(blob)
        )))
    }

    /// Decrypt an envelope with whichever configured key it names.
    pub fn unseal(&self, sealed: &SealedSecret) -> Result<Zeroizing<String>, CryptoError> {
        let mut parts = sealed.as_str().splitn(3, ':');
        let (version, kid, body) = match (parts.next(), parts.next(), parts.next()) {
            (Some(v), Some(k), Some(b)) => (v, k, b),
            _ => {
                return Err(CryptoError::MalformedEnvelope(
                    "expected version:kid:payload".to_string(),
                ))
            }
        };
        if version != ENVELOPE_VERSION {
            return Err(CryptoError::MalformedEnvelope(format!(
                "unsupported version {version:?}"
            )));
        }
        let key = self
            .keys
            .iter()
            .find(|k| k.kid == kid)
            .ok_or_else(|| CryptoError::UnknownKeyId(kid.to_string()))?;

        let blob = hex::decode(body)
            .map_err(|_| CryptoError::MalformedEnvelope("payload is not hex".to_string()))?;
        if blob.len() < NONCE_SIZE {
            return Err(CryptoError::MalformedEnvelope(format!(
                "payload too short: expected at least {NONCE_SIZE} bytes, got {}",
                blob.len()
            )));
        }
        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_SIZE);
        let plaintext = Zeroizing::new(
            key.cipher()?
                .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
                .map_err(|_| CryptoError::DecryptionFailed)?,
        );
        let text = std::str::from_utf8(&plaintext).map_err(|_| CryptoError::InvalidUtf8)?;
        Ok(Zeroizing::new(text.to_string()))
    }

    /// Whether `sealed` was produced under a key other than the active one.
    pub fn needs_reseal(&self, sealed: &SealedSecret) -> bool {
        let kid = sealed.as_str().split(':').nth(1).unwrap_or_default();
        kid != self.active_kid()
    }
}

/// Generate a fresh `kid:hex` keyring entry.
pub fn generate_key_entry(kid: &str) -> Result<String, CryptoError> {
    validate_kid(kid)?;
    let mut material = Zeroizing::new([0u8; KEY_SIZE]);
    OsRng.fill_bytes(material.as_mut_slice());
    Ok(format!("{kid}:{}", hex::encode(material.as_slice())))
}

fn validate_kid(kid: &str) -> Result<(), CryptoError> {
    let ok = !kid.is_empty()
        && kid.len() <= 32
        && kid
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(CryptoError::InvalidKeyring(format!(
            "key id {kid:?} must be 1-32 chars of [A-Za-z0-9_-]"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const K1: &str = "k1:0101010101010101010101010101010101010101010101010101010101010101";
    const K2: &str = "k2:0202020202020202020202020202020202020202020202020202020202020202";

    // ── keyring parsing ──────────────────────────────────────────────

    #[test]
    fn first_entry_is_active() {
        let sealer = AccountSealer::from_keyring(&format!("{K2},{K1}")).unwrap();
        assert_eq!(sealer.active_kid(), "k2");
    }

    #[test]
    fn rejects_bad_keyrings() {
        assert!(AccountSealer::from_keyring("").is_err());
        assert!(AccountSealer::from_keyring("k1:abcd").is_err());
        assert!(AccountSealer::from_keyring("nokid").is_err());
        assert!(AccountSealer::from_keyring(&format!("{K1},{K1}")).is_err());
        assert!(AccountSealer::from_keyring("bad kid:00").is_err());
    }

    #[test]
    fn debug_lists_only_key_ids() {
        let sealer = AccountSealer::from_keyring(K1).unwrap();
        let rendered = format!("{sealer:?}");
        assert!(rendered.contains("k1"));
        assert!(!rendered.contains("0101"));
    }

    // ── seal / unseal ────────────────────────────────────────────────

    #[test]
    fn seal_then_unseal() {
        let sealer = AccountSealer::from_keyring(K1).unwrap();
        let sealed = sealer.seal("000123456789").unwrap();
        assert!(sealed.as_str().starts_with("v1:k1:"));
        assert!(!sealed.as_str().contains("000123456789"));
        assert_eq!(sealer.unseal(&sealed).unwrap().as_str(), "000123456789");
    }

    #[test]
    fn nonces_differ_per_seal() {
        let sealer = AccountSealer::from_keyring(K1).unwrap();
        let a = sealer.seal("same").unwrap();
        let b = sealer.seal("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn retired_key_still_unseals_after_rotation() {
        let old = AccountSealer::from_keyring(K1).unwrap();
        let sealed = old.seal("121042882").unwrap();

        let rotated = AccountSealer::from_keyring(&format!("{K2},{K1}")).unwrap();
        assert_eq!(rotated.unseal(&sealed).unwrap().as_str(), "121042882");
        assert!(rotated.needs_reseal(&sealed));

        let resealed = rotated.seal("121042882").unwrap();
        assert!(!rotated.needs_reseal(&resealed));
    }

    #[test]
    fn unknown_kid_and_tampering_are_rejected() {
        let sealer = AccountSealer::from_keyring(K1).unwrap();
        let other = AccountSealer::from_keyring(K2).unwrap();
        let sealed = other.seal("secret").unwrap();
        assert!(matches!(
            sealer.unseal(&sealed),
            Err(CryptoError::UnknownKeyId(_))
        ));

        let good = sealer.seal("secret").unwrap();
        let mut chars: Vec<char> = good.as_str().chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == '0' { '1' } else { '0' };
        let tampered = SealedSecret::from_stored(chars.into_iter().collect::<String>());
        assert!(matches!(
            sealer.unseal(&tampered),
            Err(CryptoError::DecryptionFailed)
        ));

        assert!(matches!(
            sealer.unseal(&SealedSecret::from_stored("v1:k1:00")),
            Err(CryptoError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            sealer.unseal(&SealedSecret::from_stored("plaintext")),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn generated_entries_parse() {
        let entry = generate_key_entry("2026-q4").unwrap();
        let sealer = AccountSealer::from_keyring(&entry).unwrap();
        assert_eq!(sealer.active_kid(), "2026-q4");
        assert!(generate_key_entry("has:colon").is_err());
    }

    #[test]
    fn ephemeral_key_round_trips() {
        let sealer = AccountSealer::ephemeral();
        let sealed = sealer.seal("42").unwrap();
        assert_eq!(sealer.unseal(&sealed).unwrap().as_str(), "42");
    }
}
