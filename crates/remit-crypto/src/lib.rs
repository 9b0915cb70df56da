//! # remit-crypto: Cryptographic Primitives for Tax Remittance
//!
//! - **Account sealing**: bank routing and account numbers are encrypted at
//!   rest with AES-256-GCM under a key-id tagged keyring
//!   ([`AccountSealer`]). The first configured key seals; every configured
//!   key can unseal, so retired keys stay readable during rotation.
//! - **Webhook signatures**: HMAC-SHA256 over the raw request body,
//!   hex-encoded, compared in constant time ([`verify_webhook_signature`]).
//!
//! Plaintext account numbers never leave this crate inside a type that
//! implements `Debug` without redaction.

pub mod error;
pub mod sealing;
pub mod webhook;

pub use error::CryptoError;
pub use sealing::{generate_key_entry, AccountSealer};
pub use webhook::{sign_webhook_payload, verify_webhook_signature};
