//! # Domain Identity Newtypes
//!
//! Newtype wrappers for every identifier in the remittance engine. A
//! `RemittanceId` cannot be passed where an `AchPaymentId` is expected, and
//! identifiers minted by the ACH gateway are kept apart from local UUIDs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Maximum accepted length of a gateway-issued identifier.
const MAX_EXTERNAL_ID_LEN: usize = 128;

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Access the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

uuid_identifier!(
    /// A merchant whose orders and tax obligations are isolated from others.
    TenantId,
    "tenant"
);

uuid_identifier!(
    /// A `TaxRemittance` record.
    RemittanceId,
    "remittance"
);

uuid_identifier!(
    /// A local `TaxAchPayment` record.
    AchPaymentId,
    "ach-payment"
);

uuid_identifier!(
    /// An order in the external order store.
    OrderId,
    "order"
);

macro_rules! external_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate a gateway-issued identifier: non-empty after trimming,
            /// at most 128 bytes.
            pub fn new(raw: impl Into<String>) -> Result<Self, ValidationError> {
                let raw = raw.into();
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(ValidationError::InvalidIdentifier(
                        concat!(stringify!($name), " must not be empty").to_string(),
                    ));
                }
                if trimmed.len() > MAX_EXTERNAL_ID_LEN {
                    return Err(ValidationError::InvalidIdentifier(format!(
                        "{} exceeds {MAX_EXTERNAL_ID_LEN} bytes",
                        stringify!($name)
                    )));
                }
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                value.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

external_identifier!(
    /// Payment identifier issued by the ACH gateway.
    ExternalPaymentId
);

external_identifier!(
    /// Funding-account identifier issued by the ACH gateway when a tenant links a bank account.
    ExternalAccountId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_ids_display_with_namespace() {
        let id = RemittanceId::from_uuid(Uuid::nil());
        assert_eq!(
            id.to_string(),
            "remittance:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn uuid_ids_serialize_transparently() {
        let id = TenantId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_uuid()));
    }

    #[test]
    fn external_ids_are_trimmed_and_bounded() {
        assert_eq!(ExternalPaymentId::new("  pay_123 ").unwrap().as_str(), "pay_123");
        assert!(ExternalPaymentId::new("   ").is_err());
        assert!(ExternalAccountId::new("x".repeat(129)).is_err());
    }

    #[test]
    fn external_id_deserialization_validates() {
        let ok: ExternalPaymentId = serde_json::from_str("\"pay_1\"").unwrap();
        assert_eq!(ok.as_str(), "pay_1");
        assert!(serde_json::from_str::<ExternalPaymentId>("\"\"").is_err());
    }
}
