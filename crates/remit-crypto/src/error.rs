//! # Cryptographic Error Types

use thiserror::Error;

/// Errors from sealing and signing operations.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Keyring configuration could not be parsed.
    #[error("invalid sealing keyring: {0}")]
    InvalidKeyring(String),

    /// Envelope is not in `v1:{kid}:{hex}` form.
    #[error("malformed sealed value: {0}")]
    MalformedEnvelope(String),

    /// Envelope names a key id that is not in the keyring.
    #[error("unknown sealing key id {0:?}")]
    UnknownKeyId(String),

    /// AEAD encryption failed.
    #[error("encryption failed")]
    EncryptionFailed,

    /// AEAD tag check failed (wrong key or tampered ciphertext).
    #[error("decryption failed (wrong key or corrupted data)")]
    DecryptionFailed,

    /// Decrypted bytes are not UTF-8.
    #[error("decrypted data is not valid UTF-8")]
    InvalidUtf8,

    /// HMAC key rejected.
    #[error("invalid HMAC key")]
    InvalidMacKey,
}
